//! Arrival-order independence of the request table.
//!
//! The wire protocol does not guarantee that the start notification for a
//! request is observed before its response; the table must converge on the
//! same record either way.

use std::collections::HashMap;

use network_tap::{NetworkTap, RequestStage, TapEvent};

fn headers(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn lifecycle(id: &str) -> [TapEvent; 3] {
    [
        TapEvent::RequestWillBeSent {
            request_id: id.to_string(),
            url: "https://x".to_string(),
            method: "GET".to_string(),
            headers: headers(&[("accept", "*/*")]),
            category: Some("Fetch".to_string()),
            timestamp: 1_234.0,
        },
        TapEvent::ResponseReceived {
            request_id: id.to_string(),
            status: 200,
            headers: headers(&[("content-length", "4567")]),
            byte_size: None,
        },
        TapEvent::LoadingFinished {
            request_id: id.to_string(),
            byte_size: 4567,
        },
    ]
}

#[test]
fn response_start_finish_converges_with_canonical_order() {
    let canonical = NetworkTap::new();
    let [start, response, finish] = lifecycle("r1");
    canonical.apply(start.clone());
    canonical.apply(response.clone());
    canonical.apply(finish.clone());

    let raced = NetworkTap::new();
    raced.apply(response);
    raced.apply(start);
    raced.apply(finish);

    let expect = canonical.get("r1").expect("canonical record");
    let got = raced.get("r1").expect("raced record");

    assert_eq!(got.stage, RequestStage::Completed);
    assert_eq!(got.url, expect.url);
    assert_eq!(got.method, expect.method);
    assert_eq!(got.status, expect.status);
    assert_eq!(got.byte_size, expect.byte_size);
    assert_eq!(got.category, expect.category);
    assert_eq!(got.request_headers, expect.request_headers);
    assert_eq!(got.response_headers, expect.response_headers);
    assert_eq!(raced.len(), 1);
}

#[test]
fn replayed_lifecycle_does_not_duplicate_or_accumulate() {
    let tap = NetworkTap::new();
    for _ in 0..2 {
        for event in lifecycle("r1") {
            tap.apply(event);
        }
    }

    assert_eq!(tap.len(), 1);
    let record = tap.get("r1").expect("record");
    assert_eq!(record.byte_size, Some(4567));
    assert_eq!(record.stage, RequestStage::Completed);
}

#[test]
fn response_start_finish_sequence_completes_the_record() {
    let tap = NetworkTap::new();
    tap.apply(TapEvent::ResponseReceived {
        request_id: "r1".to_string(),
        status: 200,
        headers: None,
        byte_size: None,
    });
    tap.apply(TapEvent::RequestWillBeSent {
        request_id: "r1".to_string(),
        url: "https://x".to_string(),
        method: "GET".to_string(),
        headers: None,
        category: None,
        timestamp: 5.0,
    });
    tap.apply(TapEvent::LoadingFinished {
        request_id: "r1".to_string(),
        byte_size: 4567,
    });

    let record = tap.get("r1").expect("record");
    assert_eq!(record.id, "r1");
    assert_eq!(record.url, "https://x");
    assert_eq!(record.method, "GET");
    assert_eq!(record.status, Some(200));
    assert_eq!(record.byte_size, Some(4567));
    assert_eq!(record.stage, RequestStage::Completed);
}
