//! PDO guard behavior against a node which enforces the PDO configuration rules
use integration_tests::{
    sim_bus::{Request, SimBus, SimBusReceiver, SimBusSender},
    sim_node::SimNode,
};
use yacc_client::{
    CanConnection, GuardError, LivenessError, PdoGuard, PdoState, SdoClient, Timeouts,
    TransferError,
};
use yacc_common::{messages::NmtCommandSpecifier, sdo::AbortCode, NmtState, NodeId};

const NODE: u8 = 5;

fn connect(bus: &SimBus) -> CanConnection<SimBusSender, SimBusReceiver> {
    let (sender, receiver) = bus.new_pair();
    CanConnection::new(
        NodeId::new(NODE).unwrap(),
        Timeouts::default(),
        sender,
        receiver,
    )
}

#[test]
fn test_unguarded_mapping_write_is_rejected() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    let (sender, receiver) = bus.new_pair();
    let mut client = SdoClient::new_std(NodeId::new(NODE).unwrap(), sender, receiver);

    let err = client
        .download(0x1A00, 1, &0x2100_0010u32.to_le_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::ServerAbort { abort_code, .. }
            if abort_code == AbortCode::CantStoreDeviceState as u32
    ));
}

#[test]
fn test_mapping_write_sequence() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    let mut conn = connect(&bus);

    let state = PdoGuard::new(&mut conn, 0x1A00)
        .write(1, &0x2100_0010u32.to_le_bytes())
        .unwrap();
    assert_eq!(
        PdoState {
            was_enabled: true,
            had_mapping: true
        },
        state
    );

    assert_eq!(
        vec![
            Request::Nmt(NmtCommandSpecifier::EnterPreOp, NODE),
            Request::Upload(0x1800, 1),
            Request::Download(0x1800, 1, vec![0x85, 0x01, 0x00, 0x80]),
            Request::Upload(0x1A00, 0),
            Request::Download(0x1A00, 0, vec![0]),
            Request::Download(0x1A00, 1, vec![0x10, 0x00, 0x00, 0x21]),
            Request::Download(0x1A00, 0, vec![2]),
            Request::Download(0x1800, 1, vec![0x85, 0x01, 0x00, 0x00]),
        ],
        bus.requests()
    );

    let node = bus.node(NODE);
    assert_eq!(NmtState::PreOperational, node.state());
    assert_eq!(Some(&[0x10, 0x00, 0x00, 0x21][..]), node.register(0x1A00, 1));
    assert_eq!(Some(&[2][..]), node.register(0x1A00, 0));
    assert_eq!(Some(&[0x85, 0x01, 0x00, 0x00][..]), node.register(0x1800, 1));
}

#[test]
fn test_cob_id_write_is_not_restored() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    let mut conn = connect(&bus);

    let state = PdoGuard::new(&mut conn, 0x1800)
        .write(1, &0x285u32.to_le_bytes())
        .unwrap();
    assert!(state.was_enabled);
    assert!(!state.had_mapping);

    assert_eq!(
        vec![
            Request::Nmt(NmtCommandSpecifier::EnterPreOp, NODE),
            Request::Upload(0x1800, 1),
            Request::Download(0x1800, 1, vec![0x85, 0x01, 0x00, 0x80]),
            Request::Download(0x1800, 1, vec![0x85, 0x02, 0x00, 0x00]),
        ],
        bus.requests()
    );
    assert_eq!(
        Some(&[0x85, 0x02, 0x00, 0x00][..]),
        bus.node(NODE).register(0x1800, 1)
    );
}

#[test]
fn test_disabled_pdo_is_left_disabled() {
    let node = SimNode::drive(NODE).with_register(0x1800, 1, &0x8000_0185u32.to_le_bytes());
    let bus = SimBus::new(vec![node]);
    let mut conn = connect(&bus);

    let state = PdoGuard::new(&mut conn, 0x1800).write(2, &[0xFE]).unwrap();
    assert_eq!(PdoState::default(), state);
    assert_eq!(
        vec![
            Request::Nmt(NmtCommandSpecifier::EnterPreOp, NODE),
            Request::Upload(0x1800, 1),
            Request::Download(0x1800, 2, vec![0xFE]),
        ],
        bus.requests()
    );
    assert_eq!(
        Some(&[0x85, 0x01, 0x00, 0x80][..]),
        bus.node(NODE).register(0x1800, 1)
    );
}

#[test]
fn test_plain_object_write_skips_suspension() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    let mut conn = connect(&bus);

    let state = PdoGuard::new(&mut conn, 0x2100)
        .write(0, &2000u16.to_le_bytes())
        .unwrap();
    assert_eq!(PdoState::default(), state);
    assert_eq!(
        vec![Request::Download(0x2100, 0, vec![0xD0, 0x07])],
        bus.requests()
    );
    assert_eq!(NmtState::Operational, bus.node(NODE).state());
}

#[test]
fn test_failed_write_still_restores() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    let mut conn = connect(&bus);

    // The node has no third mapping entry
    let err = PdoGuard::new(&mut conn, 0x1A00)
        .write(3, &0x2200_0010u32.to_le_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        GuardError::Transfer {
            index: 0x1A00,
            sub: 3,
            ..
        }
    ));

    let node = bus.node(NODE);
    assert_eq!(Some(&[2][..]), node.register(0x1A00, 0));
    assert_eq!(Some(&[0x85, 0x01, 0x00, 0x00][..]), node.register(0x1800, 1));
}

#[test]
fn test_node_refusing_pre_operational() {
    let bus = SimBus::new(vec![SimNode::drive(NODE).frozen()]);
    let mut conn = connect(&bus);

    let err = PdoGuard::new(&mut conn, 0x1A00)
        .write(1, &0x2100_0010u32.to_le_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        GuardError::Liveness {
            source: LivenessError::UnexpectedState {
                expected: NmtState::PreOperational,
                actual: NmtState::Operational,
            }
        }
    ));
    // Nothing is touched once the state check fails
    assert_eq!(
        vec![Request::Nmt(NmtCommandSpecifier::EnterPreOp, NODE)],
        bus.requests()
    );
}

#[test]
fn test_silent_node() {
    let bus = SimBus::new(vec![SimNode::drive(NODE).silent()]);
    let mut conn = connect(&bus);

    let err = PdoGuard::new(&mut conn, 0x1800)
        .write(2, &[0xFE])
        .unwrap_err();
    assert!(matches!(
        err,
        GuardError::Liveness {
            source: LivenessError::NoHeartbeat { .. }
        }
    ));
    assert!(bus.node(NODE).writes().is_empty());
}

#[test]
fn test_other_nodes_ignore_traffic() {
    let bus = SimBus::new(vec![SimNode::drive(NODE), SimNode::drive(NODE + 1)]);
    let mut conn = connect(&bus);

    PdoGuard::new(&mut conn, 0x1800).write(2, &[0xFE]).unwrap();
    assert_eq!(Some(&[0xFE][..]), bus.node(NODE).register(0x1800, 2));
    assert_eq!(Some(&[1][..]), bus.node(NODE + 1).register(0x1800, 2));
    assert_eq!(NmtState::Operational, bus.node(NODE + 1).state());
}
