//! Content generation: element lists to tracked, personalized HTML and text.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use url::form_urlencoded;

use super::model::{EmailElement, TrackingContext};
use crate::subscriber::Subscriber;

#[allow(clippy::unwrap_used)]
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).unwrap());

/// Turns element lists into per-recipient email bodies.
///
/// The tracking pixel and click-link rewriting live entirely here; the send
/// orchestrator only supplies the ids to embed.
pub trait ContentGenerator: Send + Sync {
    /// Render the HTML body.
    ///
    /// With a [`TrackingContext`], embeds an open-tracking pixel and
    /// rewrites links through the click-tracking redirect.
    fn html(
        &self,
        elements: &[EmailElement],
        subject: &str,
        preheader: Option<&str>,
        tracking: Option<&TrackingContext>,
    ) -> String;

    /// Render the plain-text body.
    fn text(&self, elements: &[EmailElement]) -> String;

    /// Substitute `{{...}}` personalization variables with recipient fields.
    fn personalize(&self, content: &str, recipient: &Subscriber) -> String;
}

/// Default generator producing minimal, mail-client-safe HTML.
pub struct ElementGenerator {
    site_url: String,
}

impl ElementGenerator {
    /// Creates a generator whose tracking and unsubscribe links point at
    /// `site_url`.
    #[must_use]
    pub fn new(site_url: impl Into<String>) -> Self {
        let mut site_url = site_url.into();
        while site_url.ends_with('/') {
            site_url.pop();
        }
        Self { site_url }
    }

    fn unsubscribe_url(&self, email: &str) -> String {
        format!("{}/unsubscribe?email={}", self.site_url, encode(email))
    }

    fn tracking_pixel(&self, tracking: &TrackingContext) -> String {
        format!(
            r#"<img src="{}/track/open?c={}&u={}&s={}" width="1" height="1" style="display:block;border:0;" alt="" />"#,
            self.site_url, tracking.campaign_id, tracking.subscriber_id, tracking.send_id
        )
    }

    /// Rewrite every href through the click-tracking redirect.
    ///
    /// Skips mailto links, unsubscribe links, and already-tracked URLs.
    fn rewrite_links(&self, html: &str, tracking: &TrackingContext) -> String {
        HREF_RE
            .replace_all(html, |caps: &regex::Captures<'_>| {
                let target = &caps[1];
                if target.starts_with("mailto:")
                    || target.contains("/unsubscribe")
                    || target.contains("/track/click")
                {
                    return caps[0].to_string();
                }
                format!(
                    r#"href="{}/track/click?c={}&u={}&s={}&url={}""#,
                    self.site_url,
                    tracking.campaign_id,
                    tracking.subscriber_id,
                    tracking.send_id,
                    encode(target)
                )
            })
            .into_owned()
    }

    fn element_html(&self, element: &EmailElement) -> String {
        match element {
            EmailElement::Header { content } => {
                format!("<h1 style=\"margin:0 0 1rem 0;\">{content}</h1>")
            }
            EmailElement::Text { content } => {
                format!("<p style=\"margin:0 0 1rem 0;line-height:1.6;\">{content}</p>")
            }
            EmailElement::Button { content, url } => format!(
                "<p style=\"text-align:center;margin:2rem 0;\">\
                 <a href=\"{url}\" style=\"display:inline-block;padding:12px 24px;\">{content}</a>\
                 </p>"
            ),
            EmailElement::Image { src } => format!(
                "<p style=\"text-align:center;\"><img src=\"{src}\" style=\"max-width:100%;\" alt=\"\" /></p>"
            ),
            EmailElement::Divider => "<hr style=\"border:none;border-top:1px solid #ddd;\" />".to_string(),
            EmailElement::Spacer { height } => {
                format!("<div style=\"height:{}px;\"></div>", height.unwrap_or(20))
            }
            EmailElement::Footer { content } => {
                let text = content.as_deref().unwrap_or("You are receiving this email because you subscribed to our list.");
                format!(
                    "<footer style=\"font-size:12px;color:#666;margin-top:2rem;\">\
                     <p>{text}</p>\
                     <p><a href=\"{{{{unsubscribeUrl}}}}\">Unsubscribe</a></p>\
                     </footer>"
                )
            }
        }
    }
}

impl ContentGenerator for ElementGenerator {
    fn html(
        &self,
        elements: &[EmailElement],
        subject: &str,
        preheader: Option<&str>,
        tracking: Option<&TrackingContext>,
    ) -> String {
        let mut body = String::new();
        for element in elements {
            let _ = writeln!(body, "{}", self.element_html(element));
        }

        let preheader_html = preheader.map_or_else(String::new, |p| {
            format!("<div style=\"display:none;max-height:0;overflow:hidden;\">{p}</div>\n")
        });

        let mut html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{subject}</title>\n</head>\n\
             <body style=\"margin:0;padding:20px;font-family:Arial,sans-serif;\">\n{preheader_html}\
             <div style=\"max-width:600px;margin:0 auto;\">\n{body}</div>\n"
        );

        if let Some(tracking) = tracking {
            html.push_str(&self.tracking_pixel(tracking));
            html.push('\n');
        }
        html.push_str("</body>\n</html>\n");

        if let Some(tracking) = tracking {
            html = self.rewrite_links(&html, tracking);
        }
        html
    }

    fn text(&self, elements: &[EmailElement]) -> String {
        let mut out = String::new();
        for element in elements {
            match element {
                EmailElement::Header { content } => {
                    let _ = writeln!(out, "{content}\n{}", "=".repeat(content.len()));
                }
                EmailElement::Text { content } => {
                    let _ = writeln!(out, "{content}");
                }
                EmailElement::Button { content, url } => {
                    let _ = writeln!(out, "{content}: {url}");
                }
                EmailElement::Image { src } => {
                    let _ = writeln!(out, "[Image: {src}]");
                }
                EmailElement::Divider => {
                    let _ = writeln!(out, "{}", "-".repeat(50));
                }
                EmailElement::Spacer { .. } => out.push('\n'),
                EmailElement::Footer { content } => {
                    let text = content.as_deref().unwrap_or(
                        "You are receiving this email because you subscribed to our list.",
                    );
                    let _ = writeln!(out, "\n{text}\nUnsubscribe: {{{{unsubscribeUrl}}}}");
                }
            }
            out.push('\n');
        }
        out.trim().to_string()
    }

    fn personalize(&self, content: &str, recipient: &Subscriber) -> String {
        let first_name = recipient.first_name.as_deref().unwrap_or("there");
        let last_name = recipient.last_name.as_deref().unwrap_or("");
        let full_name = recipient.display_name();

        content
            .replace("{{firstName}}", first_name)
            .replace("{{lastName}}", last_name)
            .replace("{{fullName}}", &full_name)
            .replace("{{email}}", &recipient.email)
            .replace("{{unsubscribeUrl}}", &self.unsubscribe_url(&recipient.email))
    }
}

/// Percent-encode a query-string value.
fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignId, SendId};
    use crate::subscriber::{SubscriberId, SubscriberStatus};
    use chrono::Utc;

    fn recipient() -> Subscriber {
        Subscriber {
            id: SubscriberId(7),
            email: "jane@example.com".to_string(),
            status: SubscriberStatus::Active,
            profile_id: None,
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            subscribe_date: Utc::now(),
        }
    }

    fn tracking() -> TrackingContext {
        TrackingContext {
            campaign_id: CampaignId(3),
            subscriber_id: SubscriberId(7),
            send_id: SendId(11),
        }
    }

    #[test]
    fn test_html_embeds_tracking_pixel() {
        let generator = ElementGenerator::new("https://mail.example.com/");
        let elements = vec![EmailElement::Text {
            content: "Hello".to_string(),
        }];

        let html = generator.html(&elements, "Subject", None, Some(&tracking()));
        assert!(html.contains("https://mail.example.com/track/open?c=3&u=7&s=11"));

        let untracked = generator.html(&elements, "Subject", None, None);
        assert!(!untracked.contains("/track/open"));
    }

    #[test]
    fn test_click_links_are_rewritten() {
        let generator = ElementGenerator::new("https://mail.example.com");
        let elements = vec![EmailElement::Button {
            content: "Buy".to_string(),
            url: "https://shop.example.com/deal?x=1".to_string(),
        }];

        let html = generator.html(&elements, "Subject", None, Some(&tracking()));
        assert!(html.contains("/track/click?c=3&u=7&s=11&url=https%3A%2F%2Fshop.example.com%2Fdeal%3Fx%3D1"));
        assert!(!html.contains("href=\"https://shop.example.com"));
    }

    #[test]
    fn test_unsubscribe_and_mailto_links_untouched() {
        let generator = ElementGenerator::new("https://mail.example.com");
        let elements = vec![
            EmailElement::Footer { content: None },
            EmailElement::Text {
                content: r#"<a href="mailto:help@example.com">help</a>"#.to_string(),
            },
        ];

        let html = generator.html(&elements, "Subject", None, Some(&tracking()));
        let personalized = generator.personalize(&html, &recipient());
        assert!(personalized.contains("mailto:help@example.com"));
        assert!(
            personalized.contains("https://mail.example.com/unsubscribe?email=jane%40example.com")
        );
        assert!(!personalized.contains("/track/click?c=3&u=7&s=11&url=mailto"));
    }

    #[test]
    fn test_personalize_substitutes_variables() {
        let generator = ElementGenerator::new("https://mail.example.com");
        let out = generator.personalize("Hi {{firstName}} {{lastName}} <{{email}}>", &recipient());
        assert_eq!(out, "Hi Jane Doe <jane@example.com>");

        let mut anon = recipient();
        anon.first_name = None;
        anon.last_name = None;
        let out = generator.personalize("Hi {{firstName}}", &anon);
        assert_eq!(out, "Hi there");
    }

    #[test]
    fn test_text_rendering() {
        let generator = ElementGenerator::new("https://mail.example.com");
        let text = generator.text(&[
            EmailElement::Header {
                content: "Sale".to_string(),
            },
            EmailElement::Button {
                content: "Shop".to_string(),
                url: "https://example.com".to_string(),
            },
        ]);
        assert!(text.starts_with("Sale\n===="));
        assert!(text.contains("Shop: https://example.com"));
    }
}
