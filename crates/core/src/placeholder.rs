//! The lightweight page a hibernated resource is redirected to.
//!
//! Without a configured base URL the placeholder is a self-contained
//! `data:text/html` document that shows the original title and links back to
//! the original URL. A configured base URL gets `url` and `title` query
//! parameters appended instead.

use tabflow_protocol::HibernationRecord;
use tracing::warn;
use url::Url;

/// Marker embedded in generated placeholder documents.
pub const MARKER: &str = "tabflow-hibernated";

const DATA_PREFIX: &str = "data:text/html;charset=utf-8,";

/// Builds the placeholder URL for a record.
pub fn placeholder_url(base: Option<&str>, record: &HibernationRecord) -> String {
	if let Some(base) = base {
		match Url::parse_with_params(
			base,
			&[("url", record.original_url.as_str()), ("title", record.title.as_str())],
		) {
			Ok(url) => return url.into(),
			Err(err) => warn!(target = "tabflow.sweep", %base, error = %err, "invalid placeholder base, using built-in page"),
		}
	}
	format!("{DATA_PREFIX}{}", urlencoding::encode(&render(record)))
}

/// Returns whether `url` is a placeholder produced by [`placeholder_url`].
pub fn is_placeholder(url: &str, base: Option<&str>) -> bool {
	if let Some(base) = base.filter(|b| !b.is_empty()) {
		if let (Ok(page), Ok(base)) = (Url::parse(url), Url::parse(base)) {
			if without_query(page) == without_query(base) {
				return true;
			}
		}
	}
	let Some(body) = url.strip_prefix("data:text/html") else {
		return false;
	};
	let body = body.split_once(',').map_or(body, |(_, payload)| payload);
	urlencoding::decode(body).is_ok_and(|html| html.contains(MARKER))
}

fn without_query(mut url: Url) -> Url {
	url.set_query(None);
	url.set_fragment(None);
	url
}

fn render(record: &HibernationRecord) -> String {
	let title = if record.title.is_empty() {
		escape(&record.original_url)
	} else {
		escape(&record.title)
	};
	let href = escape(&record.original_url);
	format!(
		"<!doctype html><html><head><meta charset=\"utf-8\"><meta name=\"{MARKER}\" content=\"1\">\
		 <title>💤 {title}</title></head>\
		 <body style=\"font:16px system-ui;margin:20vh auto;max-width:40em;text-align:center\">\
		 <h1>{title}</h1><p>This tab was hibernated to save memory.</p>\
		 <p><a href=\"{href}\">Reload {href}</a></p></body></html>"
	)
}

fn escape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for ch in text.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(ch),
		}
	}
	out
}
