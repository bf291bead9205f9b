//! Email content elements.

use serde::{Deserialize, Serialize};

use crate::campaign::{CampaignId, SendId};
use crate::subscriber::SubscriberId;

/// One block of campaign content.
///
/// Elements describe semantics only; visual styling is out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmailElement {
    /// A heading line.
    Header {
        /// Heading text.
        content: String,
    },
    /// A paragraph.
    Text {
        /// Paragraph text.
        content: String,
    },
    /// A call-to-action link.
    Button {
        /// Link label.
        content: String,
        /// Link target.
        url: String,
    },
    /// An image.
    Image {
        /// Image source URL.
        src: String,
    },
    /// A horizontal rule.
    Divider,
    /// Vertical whitespace.
    Spacer {
        /// Height in pixels.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    /// Footer with the unsubscribe link.
    Footer {
        /// Footer text; a default copyright line is used when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

/// Identifiers embedded into tracking URLs for one recipient's copy.
#[derive(Debug, Clone, Copy)]
pub struct TrackingContext {
    /// Campaign being sent.
    pub campaign_id: CampaignId,
    /// Recipient.
    pub subscriber_id: SubscriberId,
    /// Per-recipient send record.
    pub send_id: SendId,
}
