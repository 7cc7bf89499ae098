use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::error;

use crate::metrics::{MetricsSink, StatusReading};

fn create_router(metrics: Arc<MetricsSink>) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/metrics", get(metrics_text))
        .with_state(metrics)
}

pub async fn start(listener: TcpListener, metrics: Arc<MetricsSink>) {
    let app = create_router(metrics);
    if let Err(error) = axum::serve(listener, app).await {
        error!(%error, "http server failed");
    }
}

async fn metrics_text(State(metrics): State<Arc<MetricsSink>>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("no metrics gathered, last error:\n\n{error}"),
        )
            .into_response(),
    }
}

async fn status_page(State(metrics): State<Arc<MetricsSink>>) -> Html<String> {
    Html(render_page(&metrics.status_readings()))
}

fn render_page(rows: &[StatusReading]) -> String {
    let mut items = String::new();
    for row in rows {
        items.push_str(&format!(
            r##"  <a href="#" class="list-group-item">
    <h1 class="list-group-item-heading">{}&deg;C {}%</h1>
    <p class="list-group-item-text"><h3>{} {}</h3></p>
  </a>
"##,
            row.temperature,
            row.humidity,
            escape_html(&row.name),
            escape_html(&row.channel),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Temperature sensors</title>
<link rel="stylesheet" href="https://maxcdn.bootstrapcdn.com/bootstrap/3.3.7/css/bootstrap.min.css">
</head>
<body>
<div class="list-group">
{items}</div>
</body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
