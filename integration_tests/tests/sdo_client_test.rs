//! SDO client behavior with stray frames on the response channel
use integration_tests::{sim_bus::SimBus, sim_node::SimNode};
use yacc_client::{SdoClient, TransferError};
use yacc_common::{
    messages::{CanId, SDO_RESP_BASE},
    sdo::SdoResponse,
    NodeId,
};

const NODE: u8 = 5;

fn late_response(response: SdoResponse) -> yacc_common::messages::CanMessage {
    response.to_can_message(CanId::Std(SDO_RESP_BASE + NODE as u16))
}

#[test]
fn test_upload_skips_answer_to_earlier_request() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    // Answer to a read which already timed out
    bus.inject(late_response(SdoResponse::ConfirmUpload {
        n: 0,
        e: true,
        s: true,
        index: 0x1000,
        sub: 0,
        data: [0x91, 0x01, 0x00, 0x00],
    }));
    let (sender, receiver) = bus.new_pair();
    let mut client = SdoClient::new_std(NodeId::new(NODE).unwrap(), sender, receiver);

    assert_eq!(vec![0xE8, 0x03], client.upload(0x2100, 0).unwrap());
}

#[test]
fn test_download_skips_answer_to_earlier_request() {
    let bus = SimBus::new(vec![SimNode::drive(NODE)]);
    bus.inject(late_response(SdoResponse::ConfirmDownload {
        index: 0x1017,
        sub: 0,
    }));
    let (sender, receiver) = bus.new_pair();
    let mut client = SdoClient::new_std(NodeId::new(NODE).unwrap(), sender, receiver);

    // The drive has no 0x2400, and its abort must not be hidden by the stale confirmation
    let err = client.download(0x2400, 0, &[1]).unwrap_err();
    assert!(matches!(
        err,
        TransferError::ServerAbort {
            index: 0x2400,
            sub: 0,
            ..
        }
    ));
}

#[test]
fn test_only_stale_responses_time_out() {
    // Nothing on the bus answers
    let bus = SimBus::new(Vec::new());
    bus.inject(late_response(SdoResponse::ConfirmDownload {
        index: 0x1017,
        sub: 0,
    }));
    let (sender, receiver) = bus.new_pair();
    let mut client = SdoClient::new_std(NodeId::new(NODE).unwrap(), sender, receiver);

    let err = client.upload(0x2100, 0).unwrap_err();
    assert!(matches!(err, TransferError::NoResponse));
}
