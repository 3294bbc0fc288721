//! Property-based tests for the channel frame format.

use phx_react_proto::{
    ActionEnvelope, ChannelMessage, Params, Topic,
    channel::{DEFAULT_NAMESPACE, events},
};
use proptest::prelude::*;
use serde_json::Value;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}"
}

fn params_strategy() -> impl Strategy<Value = Params> {
    prop::collection::btree_map(ident(), any::<i64>(), 0..6).prop_map(|entries| {
        entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    })
}

proptest! {
    #[test]
    fn prop_frames_survive_the_wire(
        join_ref in prop::option::of("[0-9]{1,4}"),
        msg_ref in prop::option::of("[0-9]{1,4}"),
        page_key in ident(),
        session_id in ident(),
        params in params_strategy(),
    ) {
        let topic = Topic::for_page(DEFAULT_NAMESPACE, &page_key, &session_id);
        let msg = ChannelMessage::new(
            join_ref,
            msg_ref,
            topic.as_str(),
            events::STATE,
            serde_json::json!({ "assigns": Value::Object(params.clone()) }),
        );

        let decoded = ChannelMessage::decode(&msg.encode().unwrap()).unwrap();
        prop_assert_eq!(&decoded, &msg);
        prop_assert_eq!(decoded.state_push().assigns, params);
    }

    #[test]
    fn prop_topic_is_deterministic(page_key in ident(), session_id in ident()) {
        let a = Topic::for_page(DEFAULT_NAMESPACE, &page_key, &session_id);
        let b = Topic::for_page(DEFAULT_NAMESPACE, &page_key, &session_id);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.as_str(), format!("phx_react:{page_key}:{session_id}"));
    }

    #[test]
    fn prop_decode_never_panics(text in ".{0,64}") {
        let _ = ChannelMessage::decode(&text);
    }

    #[test]
    fn prop_error_envelope_keeps_details(code in ident(), message in ".{0,32}", details in params_strategy()) {
        let json = serde_json::json!({
            "status": "error",
            "error": { "code": code, "message": message, "details": Value::Object(details.clone()) }
        });
        let envelope: ActionEnvelope = serde_json::from_value(json).unwrap();
        match envelope {
            ActionEnvelope::Error { error } => {
                prop_assert_eq!(error.code, code);
                prop_assert_eq!(error.details, Some(details));
            },
            other => prop_assert!(false, "unexpected envelope {:?}", other),
        }
    }
}
