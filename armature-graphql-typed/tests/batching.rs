//! Batch scheduling through the client.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use armature_graphql_typed::{
    GraphQLError, GraphQLResponse, GraphQLResponseError, HeaderProvider, PathSegment, SelectionSet,
    TransportError,
};
use common::{RecordingTransport, client};
use serde_json::json;

fn me() -> SelectionSet {
    SelectionSet::new().nested("me", SelectionSet::new().field("id"))
}

fn hello(name: &str) -> SelectionSet {
    SelectionSet::new().with_args("hello", [("name", json!(name))], true)
}

#[tokio::test]
async fn test_concurrent_operations_share_one_request() {
    let transport = RecordingTransport::replying(json!({
        "data": {
            "op0__me": { "id": "1" },
            "op1__hello": "hi a",
            "op2__hello": "hi b"
        }
    }));
    let client = client(transport.clone(), Duration::from_millis(20), 10);

    let first = client.query(&me());
    let second = client.query(&hello("a"));
    let third = client.query(&hello("b"));
    let (first, second, third) = tokio::join!(first, second, third);

    assert_eq!(transport.call_count(), 1);
    let request = &transport.calls()[0].request;
    assert!(request.query.contains("op0__me: me"));
    assert!(request.query.contains("op1__hello: hello(name: $op1_hello_name)"));
    assert!(request.query.contains("op2__hello: hello(name: $op2_hello_name)"));
    assert_eq!(request.variables["op1_hello_name"], json!("a"));
    assert_eq!(request.variables["op2_hello_name"], json!("b"));

    let first = first.unwrap();
    assert_eq!(first.get("me").and_then(|me| me.typename()), Some("User"));
    assert_eq!(
        second.unwrap().get("hello").and_then(|v| v.as_str()),
        Some("hi a")
    );
    assert_eq!(
        third.unwrap().get("hello").and_then(|v| v.as_str()),
        Some("hi b")
    );
}

#[tokio::test]
async fn test_full_window_flushes_without_waiting() {
    let transport = RecordingTransport::replying(json!({
        "data": { "op0__hello": "x", "op1__hello": "y" }
    }));
    let client = client(transport.clone(), Duration::from_secs(10), 2);

    let both = async { tokio::join!(client.query(&hello("x")), client.query(&hello("y"))) };
    let (x, y) = tokio::time::timeout(Duration::from_secs(1), both)
        .await
        .expect("size-triggered flush should not wait for the interval");

    assert!(x.is_ok());
    assert!(y.is_ok());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_operations_beyond_the_limit_open_a_new_window() {
    let transport = RecordingTransport::new(|request| {
        let data = if request.variables.contains_key("op1_hello_name") {
            json!({ "op0__hello": "a", "op1__hello": "b" })
        } else {
            json!({ "op0__hello": "c" })
        };
        Ok(GraphQLResponse::from_data(data))
    });
    let client = client(transport.clone(), Duration::from_millis(20), 2);

    let (a, b, c) = tokio::join!(
        client.query(&hello("a")),
        client.query(&hello("b")),
        client.query(&hello("c"))
    );

    assert_eq!(transport.call_count(), 2);
    assert_eq!(a.unwrap().get("hello").and_then(|v| v.as_str()), Some("a"));
    assert_eq!(b.unwrap().get("hello").and_then(|v| v.as_str()), Some("b"));
    assert_eq!(c.unwrap().get("hello").and_then(|v| v.as_str()), Some("c"));
}

#[tokio::test]
async fn test_transport_failure_rejects_every_operation() {
    let transport = RecordingTransport::new(|_| {
        Err(TransportError::with_status(502, "HTTP 502 Bad Gateway"))
    });
    let client = client(transport.clone(), Duration::from_millis(20), 10);

    let results = client.query_all(&[me(), hello("a"), hello("b")]).await;

    assert_eq!(transport.call_count(), 1);
    assert_eq!(results.len(), 3);
    for result in results {
        match result {
            Err(GraphQLError::Transport(error)) => {
                assert_eq!(error.status, Some(502));
                assert_eq!(error.message, "HTTP 502 Bad Gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_errors_reach_only_the_operation_they_belong_to() {
    let transport = RecordingTransport::replying(json!({
        "data": { "op0__me": { "id": "1" }, "op1__hello": null },
        "errors": [
            { "message": "name is banned", "path": ["op1__hello"] }
        ]
    }));
    let client = client(transport.clone(), Duration::from_millis(20), 10);

    let (ok, failed) = tokio::join!(client.query(&me()), client.query(&hello("banned")));

    assert!(ok.is_ok());
    match failed {
        Err(GraphQLError::Operation { errors, data }) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].message, "name is banned");
            assert_eq!(
                errors[0].path,
                Some(vec![PathSegment::Field("hello".to_string())])
            );
            assert_eq!(data, Some(json!({ "hello": null })));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_unattributable_errors_reach_every_operation() {
    let transport = RecordingTransport::new(|_| {
        Ok(GraphQLResponse {
            data: None,
            errors: Some(vec![GraphQLResponseError::new("service unavailable")]),
            extensions: None,
        })
    });
    let client = client(transport.clone(), Duration::from_millis(20), 10);

    let (a, b) = tokio::join!(client.query(&me()), client.query(&hello("a")));

    for result in [a, b] {
        let error = result.unwrap_err();
        assert!(error.is_graphql_error());
        assert_eq!(error.graphql_errors().unwrap()[0].message, "service unavailable");
        assert!(error.partial_data().is_none());
    }
}

#[tokio::test]
async fn test_new_window_after_dispatch() {
    let transport = RecordingTransport::replying(json!({ "data": { "op0__me": { "id": "1" } } }));
    let client = client(transport.clone(), Duration::from_millis(10), 10);

    tokio_test::assert_ok!(client.query(&me()).await);
    tokio_test::assert_ok!(client.query(&me()).await);

    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_operation_issued_during_flight_opens_a_new_window() {
    let transport = RecordingTransport::slow(Duration::from_millis(100), |request| {
        let name = request.variables["op0_hello_name"].clone();
        Ok(GraphQLResponse::from_data(json!({ "op0__hello": name })))
    });
    let client = client(transport.clone(), Duration::from_millis(10), 10);

    let first = client.query(&hello("a"));
    // past the interval, while the first batch is still waiting on the transport
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(transport.call_count(), 1);
    let second = client.query(&hello("b"));

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().get("hello").and_then(|v| v.as_str()), Some("a"));
    assert_eq!(second.unwrap().get("hello").and_then(|v| v.as_str()), Some("b"));

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    let query = &calls[1].request.query;
    assert!(query.contains("op0__hello: hello(name: $op0_hello_name)"));
    assert!(!query.contains("op1__"));
}

#[tokio::test]
async fn test_queries_and_mutations_are_not_merged() {
    let transport = RecordingTransport::new(|request| {
        let data = if request.query.starts_with("mutation") {
            json!({ "op0__createPost": { "id": "7" } })
        } else {
            json!({ "op0__me": { "id": "1" } })
        };
        Ok(GraphQLResponse::from_data(data))
    });
    let client = client(transport.clone(), Duration::from_millis(20), 10);

    let create = SelectionSet::new().with_args(
        "createPost",
        [("title", json!("Hello"))],
        SelectionSet::new().field("id"),
    );
    let (query, mutation) = tokio::join!(client.query(&me()), client.mutation(&create));

    assert!(query.is_ok());
    let mutation = mutation.unwrap();
    assert_eq!(mutation.root_type(), "Mutation");
    assert_eq!(
        mutation.get("createPost").and_then(|p| p.typename()),
        Some("Post")
    );

    let mut kinds: Vec<_> = transport
        .calls()
        .iter()
        .map(|call| call.request.query.split_whitespace().next().unwrap_or_default().to_string())
        .collect();
    kinds.sort();
    assert_eq!(kinds, vec!["mutation", "query"]);
}

#[tokio::test]
async fn test_invalid_selection_never_reaches_the_transport() {
    let transport = RecordingTransport::replying(json!({ "data": {} }));
    let client = client(transport.clone(), Duration::from_millis(5), 10);

    let bad = SelectionSet::new().nested("me", SelectionSet::new().field("nickname"));
    let result = client.query(&bad).await;

    assert!(matches!(result, Err(GraphQLError::SchemaMismatch { .. })));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_header_provider_runs_for_each_flush() {
    let transport = RecordingTransport::replying(json!({ "data": { "op0__me": { "id": "1" } } }));
    let counter = Arc::new(AtomicUsize::new(0));
    let source = counter.clone();
    let client = client(transport.clone(), Duration::from_millis(10), 10).with_headers(
        HeaderProvider::bearer(move || {
            let n = source.fetch_add(1, Ordering::SeqCst);
            Some(format!("token-{}", n))
        }),
    );

    client.query(&me()).await.unwrap();
    client.query(&me()).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    let calls = transport.calls();
    assert_eq!(
        calls[0].headers,
        vec![("authorization".to_string(), "Bearer token-0".to_string())]
    );
    assert_eq!(
        calls[1].headers,
        vec![("authorization".to_string(), "Bearer token-1".to_string())]
    );
}
