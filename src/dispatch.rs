use serde_json::Value as JsonValue;
use tracing::debug;

use crate::browser::{describe, Browser, NativeEvent};
use crate::queue::Update;
use crate::reconcile::{EventHandler, EventHandlers};

/// Marks a message value to be replaced by the live value of the element
/// whose id follows the marker.
pub const VALUE_FROM_ID_PREFIX: &str = "VALUE_FROM_ID:";

/// Whether `handler` applies to an event fired at `event`'s target.
pub fn handler_matches(browser: &dyn Browser, handler: &EventHandler, event: &NativeEvent) -> bool {
    if handler.config.options().match_parent_elements {
        browser.closest(event.target(), &handler.selector).is_some()
    } else {
        browser.matches(event.target(), &handler.selector)
    }
}

/// Replace `VALUE_FROM_ID:` references in a keyed message with the current
/// values of the referenced elements. Anything that is not an object passes
/// through untouched.
pub fn resolve_message(browser: &dyn Browser, msg: &JsonValue) -> JsonValue {
    let JsonValue::Object(fields) = msg else {
        return msg.clone();
    };

    let resolved = fields
        .iter()
        .map(|(name, value)| {
            let value = match value.as_str().and_then(|raw| raw.strip_prefix(VALUE_FROM_ID_PREFIX)) {
                Some(element_id) => JsonValue::String(
                    browser
                        .element_by_id(element_id)
                        .and_then(|element| browser.input_value(&element))
                        .unwrap_or_default(),
                ),
                None => value.clone(),
            };
            (name.clone(), value)
        })
        .collect();

    JsonValue::Object(resolved)
}

/// Run every handler registered for the event's type against the event and
/// pass the resulting updates to `submit`, in registration order. Returns the
/// number of handlers that fired.
pub fn dispatch_event(
    browser: &dyn Browser,
    handlers: &EventHandlers,
    event: &NativeEvent,
    debug_trace: bool,
    mut submit: impl FnMut(Update),
) -> usize {
    let candidates = handlers.handlers_for(event.event_type());
    if candidates.is_empty() {
        return 0;
    }

    if debug_trace {
        debug!(
            target = "dispatch",
            element = %describe(event.target()),
            event = event.event_type(),
            "event fired"
        );
    }

    let mut fired = 0;
    for handler in candidates
        .iter()
        .filter(|handler| handler_matches(browser, handler, event))
    {
        let options = handler.config.options();
        if options.prevent_default {
            event.prevent_default();
        }
        if options.stop_propagation {
            event.stop_propagation();
        }

        submit(Update {
            id: handler.selector.clone(),
            strategy: handler.queue_strategy,
            msg: resolve_message(browser, &handler.msg),
        });
        fired += 1;
    }
    fired
}
