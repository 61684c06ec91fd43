use air_encoding::creator;
use air_encoding::parser::{parse_structured, StructuredMessage};
use air_encoding::Error;

#[test]
fn structured_round_trip() {
    let message = StructuredMessage {
        caller_id: "CAR1",
        receiver_id: "CTRL-N",
        body: "offset 42",
    };
    let mut buf = [0u8; 64];
    let encoded = creator::structured(&mut buf, &message).unwrap();
    assert_eq!(parse_structured(encoded), Ok(message));
}

#[test]
fn multi_line_body_round_trips() {
    let message = StructuredMessage {
        caller_id: "CTRL-N",
        receiver_id: "CAR1",
        body: "line one\nline two",
    };
    let mut buf = [0u8; 64];
    let encoded = creator::structured(&mut buf, &message).unwrap();
    assert_eq!(parse_structured(encoded), Ok(message));
}

#[test]
fn missing_markers_rejected() {
    assert_eq!(parse_structured(b"AIRv1.0 CAR1 SM\nbody"), Err(Error::MissingMarker));
    assert_eq!(parse_structured(b"AIRv1.0 CAR1\nbody\nEM CTRL"), Err(Error::MissingMarker));
    assert_eq!(parse_structured(b"no newlines at all"), Err(Error::MissingMarker));
}

#[test]
fn wrong_header_rejected() {
    assert_eq!(
        parse_structured(b"AIRv2.0 CAR1 SM\nbody\nEM CTRL"),
        Err(Error::UnknownMessage)
    );
}

#[test]
fn invalid_ids_rejected() {
    let message = StructuredMessage {
        caller_id: "UNRELIABLE",
        receiver_id: "CAR1",
        body: "x",
    };
    let mut buf = [0u8; 64];
    assert_eq!(creator::structured(&mut buf, &message), Err(Error::InvalidId));
    assert_eq!(
        parse_structured(b"AIRv1.0 CAR1 SM\nx\nEM UNRELIABLE"),
        Err(Error::InvalidId)
    );
}
