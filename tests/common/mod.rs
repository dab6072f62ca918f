// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use futures::future::BoxFuture;
use policywatch::browser::{BrowserDriver, Navigation};
use policywatch::config::{Renderer, TrackedPage};
use policywatch::errors::FetchError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wiremock::ResponseTemplate;

/// Stands in for Chromium. Every navigation returns the same status.
pub struct FixedBrowser {
    status: Option<u16>,
}

impl FixedBrowser {
    pub fn new(status: Option<u16>) -> Arc<dyn BrowserDriver> {
        Arc::new(Self { status })
    }
}

impl BrowserDriver for FixedBrowser {
    fn navigate<'a>(
        &'a self,
        url: &'a str,
        _nav_timeout: Duration,
        _settle: Duration,
    ) -> BoxFuture<'a, Result<Navigation, FetchError>> {
        let status = self.status;
        Box::pin(async move {
            match status {
                Some(status) => Ok(Navigation {
                    status: Some(status),
                    html: policy_html(&["Rendered policy text for browser pages."]),
                }),
                None => Err(FetchError::NoResponse(url.to_string())),
            }
        })
    }
}

pub fn static_page(base: &str, route: &str, slug: &str) -> TrackedPage {
    TrackedPage::new(&format!("{}{}", base, route), slug, "Example", Renderer::Static)
}

pub fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .append_header("content-type", "text/html")
}

/// A help-center style page with navigation chrome around the article.
pub fn policy_html(paragraphs: &[&str]) -> String {
    let body = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Community Guidelines</title><script>var x = 1;</script></head>
<body>
  <nav><a href="/">Home</a><a href="/menu">Menu</a></nav>
  <main>
    <h1>Community Guidelines</h1>
    {}
  </main>
  <footer>Copyright 2025</footer>
</body>
</html>"#,
        body
    )
}

pub fn write_pages(dir: &Path, pages: &[TrackedPage]) -> PathBuf {
    let path = dir.join("platform_urls.json");
    let json = serde_json::to_string_pretty(pages).expect("serialize pages");
    std::fs::write(&path, json).expect("write pages");
    path
}
