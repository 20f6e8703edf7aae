//! Integration tests for the chat API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use serial_test::serial;
    use tower::util::ServiceExt;

    use ragchat::chat::StreamEvent;
    use ragchat::core::HistoryBackend;

    use crate::test_utils::{
        AUTH_HEADER, body_to_string, mock_completion_stream, parse_ndjson, test_app,
        test_app_with_config, test_config,
    };

    fn chat_request(body: Value, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/api/chat")
            .method("POST")
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(AUTH_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header(AUTH_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("DELETE")
            .body(Body::empty())
            .unwrap()
    }

    /// Send a streamed chat turn and return the decoded events.
    async fn stream_turn(app: &Router, session_id: &str, message: &str) -> Vec<StreamEvent> {
        let response = app
            .clone()
            .oneshot(chat_request(
                json!({"session_id": session_id, "message": message}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/x-ndjson"
        );
        parse_ndjson(&body_to_string(response.into_body()).await)
    }

    async fn transcript(app: &Router, session_id: &str) -> Value {
        let response = app
            .clone()
            .oneshot(get(&format!("/api/chat/{}", session_id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&body_to_string(response.into_body()).await).unwrap()
    }

    /// Tests that a chat turn streams context, deltas and done as NDJSON
    #[tokio::test]
    #[serial]
    async fn it_streams_a_chat_turn() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["You get ", "20 days", " of PTO."]).await;
        let app = test_app(&server.url()).await;

        let events = stream_turn(&app, "stream-session", "How much PTO do I get?").await;

        assert!(matches!(
            &events[0],
            StreamEvent::Context { session_id, data_points }
                if session_id == "stream-session" && data_points.is_empty()
        ));
        let deltas: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Delta { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["You get ", "20 days", " of PTO."]);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Done { persisted: true, .. })
        ));
    }

    /// Tests that the streamed answer is saved once with the ids from done
    #[tokio::test]
    #[serial]
    async fn it_persists_the_streamed_exchange() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Twenty", " days."]).await;
        let app = test_app(&server.url()).await;

        let events = stream_turn(&app, "persist-session", "How much PTO?").await;
        let Some(StreamEvent::Done {
            user_message_id,
            assistant_message_id,
            ..
        }) = events.last().cloned()
        else {
            panic!("Missing done event");
        };

        let body = transcript(&app, "persist-session").await;
        let messages = body["transcript"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], "How much PTO?");
        assert_eq!(messages[0]["metadata"]["id"], user_message_id.as_str());
        assert_eq!(messages[1]["content"], "Twenty days.");
        assert_eq!(messages[1]["metadata"]["id"], assistant_message_id.as_str());
        assert_eq!(body["session"]["title"], "How much PTO?");
    }

    /// Tests that retrying the same exchange doesn't duplicate messages
    #[tokio::test]
    #[serial]
    async fn it_suppresses_duplicate_retries() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Twenty days."]).await;
        let app = test_app(&server.url()).await;

        let first = stream_turn(&app, "retry-session", "How much PTO?").await;
        let retry = stream_turn(&app, "retry-session", "How much PTO?").await;

        let body = transcript(&app, "retry-session").await;
        assert_eq!(body["transcript"].as_array().unwrap().len(), 2);
        assert_eq!(first.last(), retry.last());
    }

    /// Tests the non-streaming JSON response
    #[tokio::test]
    #[serial]
    async fn it_answers_without_streaming() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Twenty days."},"finish_reason":"stop"}]}"#,
            )
            .create_async()
            .await;
        let app = test_app(&server.url()).await;

        let response = app
            .clone()
            .oneshot(chat_request(
                json!({"session_id": "json-session", "message": "How much PTO?", "stream": false}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["answer"], "Twenty days.");
        assert_eq!(body["persisted"], true);
        assert_eq!(body["session_id"], "json-session");
    }

    /// Tests that a model failure ends the stream with an error and saves nothing
    #[tokio::test]
    #[serial]
    async fn it_reports_model_errors_in_the_stream() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;
        let app = test_app(&server.url()).await;

        let events = stream_turn(&app, "error-session", "Hello").await;
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));

        let response = app
            .oneshot(get("/api/chat/error-session", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Tests that an empty message is rejected before anything is streamed
    #[tokio::test]
    #[serial]
    async fn it_rejects_empty_messages() {
        let app = test_app("http://localhost:1").await;
        let response = app
            .oneshot(chat_request(json!({"session_id": "s1", "message": "   "}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Tests that a malformed session id is rejected
    #[tokio::test]
    #[serial]
    async fn it_rejects_invalid_session_ids() {
        let app = test_app("http://localhost:1").await;
        let response = app
            .oneshot(chat_request(
                json!({"session_id": "not a valid id", "message": "Hello"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Tests getting chat session by ID returns 404 for non-existent session
    #[tokio::test]
    #[serial]
    async fn it_returns_404_for_nonexistent_session() {
        let app = test_app("http://localhost:1").await;
        let response = app
            .oneshot(get("/api/chat/nonexistent-session-id", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Tests deleting a single message keeps the rest of the session
    #[tokio::test]
    #[serial]
    async fn it_deletes_a_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Twenty days."]).await;
        let app = test_app(&server.url()).await;

        stream_turn(&app, "delete-session", "How much PTO?").await;
        let body = transcript(&app, "delete-session").await;
        let assistant_id = body["transcript"][1]["metadata"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(delete(&format!(
                "/api/chat/delete-session/messages/{}",
                assistant_id
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let deleted: Value =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(deleted["deleted"]["content"], "Twenty days.");

        let body = transcript(&app, "delete-session").await;
        let messages = body["transcript"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "How much PTO?");
        // Session metadata survives the rewrite
        assert_eq!(body["session"]["title"], "How much PTO?");

        // Deleting it again is a 404
        let response = app
            .oneshot(delete(&format!(
                "/api/chat/delete-session/messages/{}",
                assistant_id
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Tests deleting a whole session
    #[tokio::test]
    #[serial]
    async fn it_deletes_a_session() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Hi!"]).await;
        let app = test_app(&server.url()).await;

        stream_turn(&app, "gone-session", "Hello").await;
        let response = app
            .clone()
            .oneshot(delete("/api/chat/gone-session"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get("/api/chat/gone-session", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Tests getting chat sessions returns empty list initially
    #[tokio::test]
    #[serial]
    async fn it_gets_empty_chat_sessions() {
        let app = test_app("http://localhost:1").await;
        let response = app.oneshot(get("/api/chat/sessions", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_string(response.into_body()).await;
        assert!(body.contains("\"sessions\":[]"));
        assert!(body.contains("\"total_sessions\":0"));
    }

    /// Tests getting chat sessions with pagination
    #[tokio::test]
    #[serial]
    async fn it_gets_chat_sessions_with_pagination() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Hi!"]).await;
        let app = test_app(&server.url()).await;

        for i in 0..3 {
            stream_turn(&app, &format!("page-session-{}", i), "Hello").await;
        }

        let response = app
            .oneshot(get("/api/chat/sessions?page=2&limit=2", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["page"], 2);
        assert_eq!(body["limit"], 2);
        assert_eq!(body["total_sessions"], 3);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
    }

    /// Tests that sessions owned by one user are hidden from others
    #[tokio::test]
    #[serial]
    async fn it_enforces_session_ownership() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Hi alice"]).await;
        let app = test_app(&server.url()).await;

        let response = app
            .clone()
            .oneshot(chat_request(
                json!({"session_id": "alice-session", "message": "Hello"}),
                Some("alice"),
            ))
            .await
            .unwrap();
        body_to_string(response.into_body()).await;

        let response = app
            .clone()
            .oneshot(get("/api/chat/alice-session", Some("alice")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get("/api/chat/alice-session", Some("bob")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(get("/api/chat/sessions", Some("bob")))
            .await
            .unwrap();
        let body: Value =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["total_sessions"], 0);
    }

    /// Tests that the identity header is enforced when auth is required
    #[tokio::test]
    #[serial]
    async fn it_requires_auth_when_configured() {
        let mut config = test_config("http://localhost:1");
        config.require_auth = true;
        let app = test_app_with_config(config).await;

        let response = app
            .clone()
            .oneshot(get("/api/chat/sessions", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(get("/api/chat/sessions", Some("alice")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Tests the file history backend behind the same API
    #[tokio::test]
    #[serial]
    async fn it_stores_history_in_files() {
        let mut server = mockito::Server::new_async().await;
        let _mock = mock_completion_stream(&mut server, &["Stored ", "on disk."]).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&server.url());
        config.history_backend = HistoryBackend::File;
        config.history_path = dir.path().join("history").display().to_string();
        let app = test_app_with_config(config).await;

        stream_turn(&app, "file-session", "Where is this kept?").await;

        assert!(dir.path().join("history").join("file-session.json").exists());
        let body = transcript(&app, "file-session").await;
        assert_eq!(body["transcript"][1]["content"], "Stored on disk.");
    }
}
