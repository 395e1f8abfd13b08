use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{
    error::{AppError, Result},
    pages,
    session::SessionContext,
    AppState,
};

/// Notes and reminders of the signed-in user.
pub async fn notes(State(state): State<AppState>, session: SessionContext) -> Result<Response> {
    let token = session.token().await?.ok_or(AppError::Unauthenticated)?;
    let token = state.oauth.ensure_fresh(token, &session).await?;

    let user = state.discord.current_user(&token.access_token).await?;
    let (notes, reminders) = tokio::try_join!(
        state.crajy.fetch_notes(&user.id),
        state.crajy.fetch_reminders(&user.id),
    )?;

    info!(
        "Showing {} notes and {} reminders to user {}",
        notes.len(),
        reminders.len(),
        user.id
    );
    Ok(pages::notes_page(&user, &notes, &reminders).into_response())
}

#[cfg(test)]
mod tests {
    use crate::error::NOT_SIGNED_IN;
    use crate::session::TOKEN_KEY;
    use crate::test_support::{body_text, TestApp};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn script_user_and_records(app: &TestApp) {
        app.http.respond(
            Method::GET,
            &app.discord_user_url(),
            200,
            json!({
                "id": "42",
                "username": "crajy",
                "discriminator": "0",
                "avatar": null,
                "global_name": "Crajy Fan"
            }),
        );
        app.http.respond(
            Method::GET,
            "https://crajy.test/notes",
            200,
            json!({ "1": { "content": "buy milk" } }),
        );
        app.http.respond(
            Method::GET,
            "https://crajy.test/reminders",
            200,
            json!({ "7": { "content": "call mum" } }),
        );
    }

    #[tokio::test]
    async fn notes_without_session_is_forbidden() {
        let app = TestApp::new();

        let response = app.get("/notes", None).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, NOT_SIGNED_IN);
        assert!(app.http.requests().is_empty());
    }

    #[tokio::test]
    async fn post_notes_without_session_is_forbidden() {
        let app = TestApp::new();

        let response = app.request(Method::POST, "/notes", None).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn pending_login_is_not_signed_in() {
        let app = TestApp::new();
        let (cookie, _) = app.begin_login().await;

        let response = app.get("/notes", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signed_in_user_sees_notes_and_reminders() {
        let app = TestApp::new();
        let cookie = app.sign_in("a1", 604800).await;
        script_user_and_records(&app);

        let response = app.get("/notes", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("Crajy Fan"));
        assert!(body.contains("buy milk"));
        assert!(body.contains("call mum"));

        let user_requests = app.http.requests_to(&app.discord_user_url());
        assert_eq!(
            user_requests[0].header_value("authorization"),
            Some("Bearer a1")
        );
        let notes_requests = app.http.requests_to("https://crajy.test/notes");
        assert_eq!(notes_requests[0].header_value("user"), Some("42"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_kept_in_session() {
        let app = TestApp::new();
        let cookie = app.sign_in("stale", 0).await;
        app.script_token("fresh", "r2", 604800);
        script_user_and_records(&app);

        let response = app.get("/notes", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let token = app.session_value(TOKEN_KEY).await.unwrap();
        assert_eq!(token["access_token"], "fresh");
        assert_eq!(
            app.http.requests_to(&app.discord_user_url())[0].header_value("authorization"),
            Some("Bearer fresh")
        );

        // A later request in the same session reuses the refreshed token.
        script_user_and_records(&app);
        let response = app.get("/notes", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.http.requests_to(app.token_url()).len(), 2);
        assert_eq!(
            app.http.requests_to(&app.discord_user_url())[1].header_value("authorization"),
            Some("Bearer fresh")
        );
    }

    #[tokio::test]
    async fn revoked_token_is_forbidden() {
        let app = TestApp::new();
        let cookie = app.sign_in("revoked", 604800).await;
        app.http.respond(
            Method::GET,
            &app.discord_user_url(),
            401,
            json!({ "message": "401: Unauthorized" }),
        );

        let response = app.get("/notes", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn backend_outage_is_bad_gateway() {
        let app = TestApp::new();
        let cookie = app.sign_in("a1", 604800).await;
        app.http.respond(
            Method::GET,
            &app.discord_user_url(),
            200,
            json!({ "id": "42", "username": "crajy" }),
        );
        app.http
            .respond(Method::GET, "https://crajy.test/notes", 503, json!({}));
        app.http
            .respond(Method::GET, "https://crajy.test/reminders", 200, json!({}));

        let response = app.get("/notes", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
