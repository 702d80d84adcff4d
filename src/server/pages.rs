//! Demo page, API description and health check

use serde::Serialize;
use std::path::Path;
use warp::reply::Response;
use warp::Reply;

const FALLBACK_PAGE: &str = r#"<html>
    <body>
        <h1>Background Removal API</h1>
        <p>API is running! Demo page not found.</p>
        <p>See <a href="/api">/api</a> for the available endpoints.</p>
    </body>
</html>
"#;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
}

/// Static description of the HTTP surface
#[must_use]
pub fn api_info() -> serde_json::Value {
    let endpoints: serde_json::Map<String, serde_json::Value> = [
        ("/", "GET - Demo page"),
        ("/api", "GET - API information"),
        ("/health", "GET - Health check"),
        ("/remove-background", "POST - Remove background (JSON response)"),
        ("/remove-background-binary", "POST - Remove background (PNG file)"),
    ]
    .into_iter()
    .map(|(path, description)| (path.to_string(), serde_json::Value::from(description)))
    .collect();

    serde_json::json!({
        "message": "Background Removal API - Enhanced",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
    })
}

#[must_use]
pub fn health() -> Health {
    Health {
        status: "healthy",
        service: "background-removal-api",
    }
}

/// Serve `demo_page` when it can be read, the inline page otherwise
pub async fn demo_page(demo_page: &Path) -> Response {
    match tokio::fs::read_to_string(demo_page).await {
        Ok(html) => warp::reply::html(html).into_response(),
        Err(e) => {
            tracing::debug!(path = %demo_page.display(), "Demo page unavailable: {e}");
            warp::reply::html(FALLBACK_PAGE).into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_api_info_lists_endpoints() {
        let info = api_info();
        assert_eq!(info["version"], "2.0.0");
        assert_eq!(info["endpoints"]["/health"], "GET - Health check");
        assert_eq!(info["endpoints"].as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_health_body() {
        let value = serde_json::to_value(health()).unwrap();
        assert_eq!(value, serde_json::json!({"status": "healthy", "service": "background-removal-api"}));
    }

    #[tokio::test]
    async fn test_demo_page_fallback_and_file() {
        let missing = demo_page(Path::new("/nonexistent/demo.html")).await;
        let body = warp::hyper::body::to_bytes(missing.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("Demo page not found"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<p>custom demo</p>").unwrap();
        let served = demo_page(file.path()).await;
        let body = warp::hyper::body::to_bytes(served.into_body()).await.unwrap();
        assert_eq!(&body[..], b"<p>custom demo</p>");
    }
}
