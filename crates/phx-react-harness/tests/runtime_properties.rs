//! Property-based tests for the runtime controller.
//!
//! Random sequences of user operations, server pushes and network faults are
//! applied to a [`SimWorld`]; the standard invariants must hold once the
//! simulated network is idle after every operation.

use std::{collections::BTreeMap, time::Duration};

use phx_react_app::RuntimeConfig;
use phx_react_client::ConnectionStatus;
use phx_react_harness::{InvariantRegistry, SimServer, SimWorld};
use phx_react_proto::{ActionEnvelope, NOT_CONNECTED, Params};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    PushState(u8),
    ServerInvalidate,
    DropConnections,
    Refresh,
    Navigate(&'static str),
    PushEvent,
    Invalidate,
    Action,
    Advance(u64),
    PageOutage(bool),
    RejectJoins(bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::PushState),
        1 => Just(Op::ServerInvalidate),
        2 => Just(Op::DropConnections),
        2 => Just(Op::Refresh),
        2 => prop_oneof![Just("users"), Just("posts"), Just("missing")].prop_map(Op::Navigate),
        2 => Just(Op::PushEvent),
        1 => Just(Op::Invalidate),
        2 => Just(Op::Action),
        2 => (1u64..45).prop_map(Op::Advance),
        1 => any::<bool>().prop_map(Op::PageOutage),
        1 => any::<bool>().prop_map(Op::RejectJoins),
    ]
}

fn server() -> SimServer {
    SimServer::new()
        .with_page("users", "App.UsersPage", "users", json!({ "users": [] }))
        .with_page("posts", "App.PostsPage", "posts", json!({ "posts": [] }))
        .with_action("create_user", |_| ActionEnvelope::Ok { data: Params::new() })
}

fn world() -> SimWorld {
    match SimWorld::mounted(server(), RuntimeConfig::default(), "users") {
        Ok(world) => world,
        Err(e) => panic!("mount failed: {e}"),
    }
}

fn apply(world: &mut SimWorld, op: &Op) {
    match op {
        Op::PushState(n) => {
            let _ = world.push_state(json!({ "users": [{ "id": n }] }));
        },
        Op::ServerInvalidate => {
            let _ = world.push_invalidate();
        },
        Op::DropConnections => {
            let _ = world.drop_connections();
        },
        Op::Refresh => {
            let _ = world.refresh_page(None, BTreeMap::new());
        },
        Op::Navigate(page_key) => {
            let _ = world.refresh_page(Some(page_key), BTreeMap::new());
        },
        Op::PushEvent => world.push_event("select", Params::new()),
        Op::Invalidate => world.invalidate(None),
        Op::Action => {
            let _ = world.invoke_action("create_user", Params::new());
        },
        Op::Advance(secs) => world.advance(Duration::from_secs(*secs)),
        Op::PageOutage(outage) => world.network_mut().set_page_outage(*outage),
        Op::RejectJoins(reject) => world.network_mut().server_mut().set_reject_joins(*reject),
    }
}

proptest! {
    /// Runtime invariants hold under arbitrary operation sequences.
    #[test]
    fn prop_runtime_invariants_hold(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let mut world = world();
        let invariants = InvariantRegistry::standard();

        for op in &ops {
            apply(&mut world, op);
            let snapshot = world.snapshot();
            prop_assert!(
                invariants.check_all(&snapshot).is_ok(),
                "Invariant violated after {:?}: {:?}", op, invariants.check_all(&snapshot)
            );
        }

        world.unmount();
        prop_assert!(invariants.check_all(&world.snapshot()).is_ok());
    }

    /// Actions reach the server only from a connected session.
    #[test]
    fn prop_actions_require_connected_session(ops in prop::collection::vec(op_strategy(), 0..30)) {
        let mut world = world();

        for op in &ops {
            apply(&mut world, op);

            let connected = world.controller().status() == ConnectionStatus::Connected;
            let before = world.network().server().action_log().len();
            let result = world.invoke_action("create_user", Params::new());
            let after = world.network().server().action_log().len();

            if connected {
                prop_assert_eq!(after, before + 1);
                prop_assert_eq!(result.map(|e| e.status()), Ok("ok"));
            } else {
                prop_assert_eq!(after, before);
                let is_not_connected = matches!(
                    &result,
                    Ok(ActionEnvelope::Error { error }) if error.code == NOT_CONNECTED
                );
                prop_assert!(is_not_connected, "expected not_connected, got {:?}", result);
            }
        }
    }

    /// Clearing faults and refreshing always ends connected.
    #[test]
    fn prop_refresh_recovers_after_faults(ops in prop::collection::vec(op_strategy(), 0..30)) {
        let mut world = world();
        for op in &ops {
            apply(&mut world, op);
        }

        world.network_mut().set_page_outage(false);
        world.network_mut().server_mut().set_reject_joins(false);
        prop_assert!(world.refresh_page(None, BTreeMap::new()).is_ok());
        prop_assert_eq!(world.controller().status(), ConnectionStatus::Connected);
    }
}
