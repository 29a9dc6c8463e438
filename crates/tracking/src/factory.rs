//! Touchpoint factory — turns a raw page visit into a classified touchpoint.

use attribution_core::channels::{referrer_domain, ChannelClassifier};
use attribution_core::types::Touchpoint;
use chrono::Utc;
use tracing::debug;

use crate::events::{detect_device, PageVisit};
use crate::utm::UtmParams;

/// Builds normalized touchpoints. Holds the classifier so that the site's own
/// domains are recognised as self-referrals.
#[derive(Debug, Clone, Default)]
pub struct TouchpointFactory {
    classifier: ChannelClassifier,
}

impl TouchpointFactory {
    pub fn new(classifier: ChannelClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &ChannelClassifier {
        &self.classifier
    }

    /// Never fails: unparseable URLs or referrers degrade to "no data".
    pub fn create_touchpoint(&self, visit: &PageVisit) -> Touchpoint {
        let utm = UtmParams::from_url(&visit.url);
        let referrer = visit
            .referrer
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        let domain = referrer.and_then(referrer_domain);

        // Untagged traffic falls back to the referrer for its source.
        let source = utm.source.clone().or_else(|| domain.clone());
        let medium = utm
            .medium
            .clone()
            .or_else(|| referrer.map(|_| "referral".to_string()));

        let mut builder = Touchpoint::builder(visit.url.clone())
            .timestamp(visit.occurred_at.unwrap_or_else(Utc::now))
            .title(visit.title.clone())
            .campaign(utm.campaign)
            .term(utm.term)
            .content(utm.content)
            .referrer_domain(domain)
            .device(detect_device(visit.user_agent.as_deref()))
            .location(visit.location.clone());
        if let Some(source) = source {
            builder = builder.source(source);
        }
        if let Some(medium) = medium {
            builder = builder.medium(medium);
        }
        if let Some(referrer) = referrer {
            builder = builder.referrer(referrer);
        }

        let touchpoint = builder.build(&self.classifier);
        debug!(
            touchpoint_id = %touchpoint.id,
            source = %touchpoint.source(),
            medium = %touchpoint.medium(),
            channel = %touchpoint.channel(),
            "Touchpoint created"
        );
        touchpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attribution_core::types::DeviceType;
    use attribution_core::MarketingChannel;

    #[test]
    fn test_direct_visit() {
        let factory = TouchpointFactory::default();
        let tp = factory.create_touchpoint(&PageVisit::new("https://example.com/", "Home"));
        assert_eq!(tp.source(), "direct");
        assert_eq!(tp.medium(), "none");
        assert_eq!(tp.channel(), MarketingChannel::Direct);
        assert_eq!(tp.referrer_domain(), None);
        assert_eq!(tp.device, Some(DeviceType::Desktop));
        assert_eq!(tp.path, "/");
        assert_eq!(tp.title, "Home");
    }

    #[test]
    fn test_utm_tags_take_precedence() {
        let factory = TouchpointFactory::default();
        let visit = PageVisit::new(
            "https://example.com/landing?utm_source=google&utm_medium=cpc&utm_campaign=brand",
            "Landing",
        )
        .with_referrer("https://www.google.com/");
        let tp = factory.create_touchpoint(&visit);
        assert_eq!(tp.source(), "google");
        assert_eq!(tp.medium(), "cpc");
        assert_eq!(tp.campaign.as_deref(), Some("brand"));
        assert_eq!(tp.referrer_domain(), Some("www.google.com"));
        assert_eq!(tp.channel(), MarketingChannel::PaidSearch);
    }

    #[test]
    fn test_referrer_fallback() {
        let factory = TouchpointFactory::default();
        let visit = PageVisit::new("https://example.com/blog/post", "Post")
            .with_referrer("https://www.bing.com/search?q=agency")
            .with_user_agent("Mozilla/5.0 (Linux; Android 14) Mobile Safari");
        let tp = factory.create_touchpoint(&visit);
        assert_eq!(tp.source(), "www.bing.com");
        assert_eq!(tp.medium(), "referral");
        assert_eq!(tp.channel(), MarketingChannel::OrganicSearch);
        assert_eq!(tp.device, Some(DeviceType::Mobile));
    }

    #[test]
    fn test_invalid_referrer_degrades() {
        let factory = TouchpointFactory::default();
        let visit = PageVisit::new("not a url", "Broken").with_referrer("::garbage::");
        let tp = factory.create_touchpoint(&visit);
        assert_eq!(tp.referrer_domain(), None);
        assert_eq!(tp.source(), "direct");
        assert_eq!(tp.medium(), "referral");
        assert_eq!(tp.channel(), MarketingChannel::Referral);
    }

    #[test]
    fn test_self_referral_with_site_domains() {
        let factory = TouchpointFactory::new(ChannelClassifier::new(["example.com"]));
        let visit = PageVisit::new("https://example.com/contact", "Contact")
            .with_referrer("https://example.com/pricing");
        let tp = factory.create_touchpoint(&visit);
        assert_eq!(tp.channel(), MarketingChannel::Direct);
    }

    #[test]
    fn test_unique_ids() {
        let factory = TouchpointFactory::default();
        let visit = PageVisit::new("https://example.com/", "Home");
        let a = factory.create_touchpoint(&visit);
        let b = factory.create_touchpoint(&visit);
        assert_ne!(a.id, b.id);
    }
}
