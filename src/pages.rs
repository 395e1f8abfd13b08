//! HTML pages. Everything interpolated into a page goes through [`escape`].

use axum::response::Html;
use serde_json::Value;

use crate::types::{DiscordUser, Note, Reminder};

const STYLE: &str = r#"
    <link rel="stylesheet" href="/static/style.css">
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 640px;
            margin: 50px auto;
            padding: 20px;
            background-color: #f5f5f5;
        }
        .container {
            background: white;
            padding: 2rem;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        h1 {
            color: #2d3748;
            margin-bottom: 1rem;
        }
        p {
            color: #4a5568;
        }
        .button {
            display: inline-block;
            background: #5865f2;
            color: white;
            padding: 0.75rem 1.5rem;
            border-radius: 4px;
            text-decoration: none;
        }
        .user img {
            width: 64px;
            height: 64px;
            border-radius: 50%;
            vertical-align: middle;
            margin-right: 1rem;
        }
        .item {
            margin: 0.5rem 0;
            padding: 0.75rem;
            background: #f7fafc;
            border-left: 4px solid #5865f2;
            border-radius: 4px;
        }
        .empty {
            color: #718096;
            font-style: italic;
        }
        .error {
            color: #f56565;
            font-weight: bold;
        }
    </style>
"#;

pub fn escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title} - CrajyMinder</title>
    {STYLE}
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>
"#,
        title = escape(title),
    ))
}

pub fn index_page(signed_in: bool) -> Html<String> {
    let actions = if signed_in {
        r#"<p><a class="button" href="/notes">Your notes &amp; reminders</a></p>
        <p><a href="/logout">Sign out</a></p>"#
    } else {
        r#"<p><a class="button" href="/discord">Sign in with Discord</a></p>"#
    };

    layout(
        "Home",
        &format!(
            r#"        <h1>CrajyMinder</h1>
        <p>Keep track of the notes and reminders you saved with Crajy.</p>
        {actions}"#
        ),
    )
}

pub fn notes_page(user: &DiscordUser, notes: &[Note], reminders: &[Reminder]) -> Html<String> {
    layout(
        "Notes",
        &format!(
            r#"        <div class="user">
            <img src="{avatar}" alt="">
            <strong>{name}</strong>
        </div>
        <h1>Notes</h1>
        {notes}
        <h1>Reminders</h1>
        {reminders}
        <p><a href="/">Home</a> &middot; <a href="/logout">Sign out</a></p>"#,
            avatar = escape(&user.avatar_url()),
            name = escape(user.display_name()),
            notes = record_list(notes, "You have no notes yet."),
            reminders = record_list(reminders, "You have no reminders."),
        ),
    )
}

pub fn error_page(title: &str, detail: &str) -> Html<String> {
    layout(
        title,
        &format!(
            r#"        <h1>{title}</h1>
        <p class="error">{detail}</p>
        <p><a class="button" href="/">Back to home</a></p>"#,
            title = escape(title),
            detail = escape(detail),
        ),
    )
}

fn record_list(records: &[Value], empty: &str) -> String {
    if records.is_empty() {
        return format!(r#"<p class="empty">{}</p>"#, escape(empty));
    }

    records
        .iter()
        .map(|record| format!(r#"<div class="item">{}</div>"#, escape(&record_text(record))))
        .collect::<Vec<_>>()
        .join("\n        ")
}

// Records are opaque; show their text field when they have one.
fn record_text(record: &Value) -> String {
    match record {
        Value::String(text) => text.clone(),
        Value::Object(fields) => ["content", "note", "text", "message"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| record.to_string()),
        other => other.to_string(),
    }
}
