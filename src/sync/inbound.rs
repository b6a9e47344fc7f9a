//! Client → server propagation.
//!
//! A single-property notification from a view is either the echo of a value
//! this engine sent (consume the marker, flush any held value) or a genuine
//! client edit. Genuine edits are mirrored into the view's container and
//! buffered; the first buffered edit schedules processing, which applies the
//! whole buffer as one batch.

use std::sync::Arc;
use std::time::Instant;

use super::{Origin, StateValue, SyncContext};
use crate::channel::{ChannelKind, InboundMessage, OutboundMessage};
use crate::component::Component;
use crate::config::cfg;
use crate::error::{Result, UsageError};
use crate::ids::{RootId, ViewId};
use crate::utils::suggest::close_matches;
use crate::value::{self, Changes, Value};

enum Next {
    Flush(Changes),
    Schedule,
    Nothing,
}

impl Component {
    /// Handle one JSON message received from the view under `root`.
    pub fn handle_message(&self, ctx: &SyncContext, root: RootId, payload: &str) -> Result<()> {
        match InboundMessage::from_json(payload)? {
            InboundMessage::Change { attr, new, .. } => self.handle_change(ctx, root, &attr, new),
            InboundMessage::DomEvent(event) => self.handle_event(ctx, root, &event),
        }
    }

    /// A client property of the view under `root` changed to `value`.
    pub fn handle_change(
        &self,
        ctx: &SyncContext,
        root: RootId,
        property: &str,
        value: Value,
    ) -> Result<()> {
        let kind = &self.inner.kind;
        if kind.data_model.get(property).is_none() {
            return Err(UsageError::UnknownParameter {
                owner: kind.name.clone(),
                name: property.to_string(),
                suggestions: close_matches(
                    property,
                    kind.data_model.properties().iter().map(|p| p.name.as_str()),
                ),
            }
            .into());
        }

        let now = Instant::now();
        let mirrored = match cfg().sync.sanitize_strings {
            true => value::sanitize(value.clone()),
            false => value.clone(),
        };
        let (next, view, target, channel, document) = {
            let mut views = self.inner.views.lock();
            let Some(v) = views.get_mut(&root) else {
                crate::debug!("sync"; "change of {} for unmounted root {}", property, root);
                return Ok(());
            };
            let next = if v.echo.is_in_flight(property, now) {
                crate::debug!("echo"; "{}.{} acknowledged", v.id, property);
                Next::Flush(v.acknowledge(property, now))
            } else if v.data.matches(property, &mirrored) {
                Next::Nothing
            } else if v.buffer_client_change(property, value) {
                v.data.set(property, mirrored);
                Next::Schedule
            } else {
                v.data.set(property, mirrored);
                Next::Nothing
            };
            (next, v.id, v.target(self.inner.id), Arc::clone(&v.channel), v.document.clone())
        };

        match next {
            Next::Flush(send) if !send.is_empty() => {
                super::deliver(&channel, &target, OutboundMessage::Update { properties: send });
                document.touch(&channel);
                Ok(())
            }
            Next::Schedule if channel.kind() == ChannelKind::Direct || document.session().is_none() => {
                self.change_event(ctx, root, view)
            }
            Next::Schedule => {
                let component = self.clone();
                document.add_timeout(
                    cfg().sync.debounce(),
                    Box::new(move |ctx: &SyncContext| {
                        if let Err(err) = component.change_event(ctx, root, view) {
                            crate::log!("error"; "failed to apply client changes: {}", err);
                        }
                    }),
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Process the buffered client edits of one view, if it still exists.
    pub(crate) fn change_event(&self, ctx: &SyncContext, root: RootId, view: ViewId) -> Result<()> {
        let pending = {
            let mut views = self.inner.views.lock();
            match views.get_mut(&root) {
                Some(v) if v.id == view => v.take_pending(),
                _ => return Ok(()),
            }
        };
        if pending.is_empty() {
            return Ok(());
        }
        self.process_events(ctx, pending)
    }

    /// Apply client properties as one batch; the busy flag is raised meanwhile.
    fn process_events(&self, ctx: &SyncContext, properties: Changes) -> Result<()> {
        let _busy = ctx.busy();
        let params = self.inner.kind.transforms.to_params(properties);
        crate::debug!(
            "sync";
            "{} applying client change(s) {:?}",
            self.inner.id,
            params.keys().collect::<Vec<_>>()
        );
        let changes = params
            .into_iter()
            .map(|(k, v)| (k, StateValue::Data(v)))
            .collect();
        self.apply(ctx, changes, Origin::Client)
    }

    /// Apply every buffered client edit of every view now.
    pub fn flush_pending(&self, ctx: &SyncContext) -> Result<()> {
        let views: Vec<_> = self
            .inner
            .views
            .lock()
            .values()
            .map(|v| (v.root, v.id))
            .collect();
        for (root, view) in views {
            self.change_event(ctx, root, view)?;
        }
        Ok(())
    }
}
