//! Marketing channel taxonomy and the rule-based classifier that maps raw
//! traffic metadata (UTM tags, referrer) onto it.
//!
//! UTM tagging is inconsistent across ad platforms and email tools, so every
//! rule is a case-insensitive substring match and the first matching rule
//! wins.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Channels ───────────────────────────────────────────────────────────────

/// The ten canonical marketing channels a touchpoint can belong to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum MarketingChannel {
    OrganicSearch,
    PaidSearch,
    OrganicSocial,
    PaidSocial,
    Email,
    Direct,
    Referral,
    Display,
    Affiliate,
    Other,
}

impl MarketingChannel {
    pub const ALL: [MarketingChannel; 10] = [
        MarketingChannel::OrganicSearch,
        MarketingChannel::PaidSearch,
        MarketingChannel::OrganicSocial,
        MarketingChannel::PaidSocial,
        MarketingChannel::Email,
        MarketingChannel::Direct,
        MarketingChannel::Referral,
        MarketingChannel::Display,
        MarketingChannel::Affiliate,
        MarketingChannel::Other,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketingChannel::OrganicSearch => "organic-search",
            MarketingChannel::PaidSearch => "paid-search",
            MarketingChannel::OrganicSocial => "organic-social",
            MarketingChannel::PaidSocial => "paid-social",
            MarketingChannel::Email => "email",
            MarketingChannel::Direct => "direct",
            MarketingChannel::Referral => "referral",
            MarketingChannel::Display => "display",
            MarketingChannel::Affiliate => "affiliate",
            MarketingChannel::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MarketingChannel::OrganicSearch => "Organic Search",
            MarketingChannel::PaidSearch => "Paid Search",
            MarketingChannel::OrganicSocial => "Organic Social",
            MarketingChannel::PaidSocial => "Paid Social",
            MarketingChannel::Email => "Email",
            MarketingChannel::Direct => "Direct",
            MarketingChannel::Referral => "Referral",
            MarketingChannel::Display => "Display",
            MarketingChannel::Affiliate => "Affiliate",
            MarketingChannel::Other => "Other",
        }
    }
}

impl fmt::Display for MarketingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Rule vocabularies ──────────────────────────────────────────────────────

const PAID_SEARCH_MEDIUMS: &[&str] = &["cpc", "ppc"];
const PAID_SEARCH_SOURCES: &[&str] = &["google ads", "bing ads"];
const SEARCH_ENGINES: &[&str] = &["google", "bing", "yahoo", "duckduckgo", "baidu", "yandex"];
const EMAIL_MARKERS: &[&str] = &["email", "newsletter"];
/// Spellings of a paid social medium seen across ad platforms.
const PAID_SOCIAL_TAGS: &[&str] = &[
    "paid-social",
    "paid_social",
    "paid social",
    "paidsocial",
    "social-paid",
    "social_paid",
    "social paid",
    "socialpaid",
];
const PAID_SOCIAL_MEDIUMS: &[&str] = &["cpm"];
const SOCIAL_PLATFORMS: &[&str] = &[
    "facebook",
    "twitter",
    "linkedin",
    "instagram",
    "tiktok",
    "youtube",
    "pinterest",
];
const DISPLAY_MEDIUMS: &[&str] = &["display", "banner", "cpm"];

/// Mediums that carry no campaign intent of their own.
const UNTAGGED_MEDIUMS: &[&str] = &["none", "(none)", "referral"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Lowercased, trimmed, empty-as-absent.
fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Host name of a URL-like string. Malformed input yields `None`.
pub fn referrer_domain(referrer: &str) -> Option<String> {
    url::Url::parse(referrer.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .filter(|h| !h.is_empty())
}

// ─── Classifier ─────────────────────────────────────────────────────────────

/// Rule-based channel classifier. Holds the site's own domains so that
/// internal navigation is not counted as a referral.
#[derive(Debug, Clone, Default)]
pub struct ChannelClassifier {
    site_domains: Vec<String>,
}

impl ChannelClassifier {
    pub fn new<I, S>(site_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            site_domains: site_domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn site_domains(&self) -> &[String] {
        &self.site_domains
    }

    pub fn is_site_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.site_domains.iter().any(|d| domain.contains(d.as_str()))
    }

    /// Map traffic metadata to a channel. Total and deterministic.
    pub fn classify(
        &self,
        source: Option<&str>,
        medium: Option<&str>,
        referrer: Option<&str>,
        referrer_domain: Option<&str>,
    ) -> MarketingChannel {
        let source = normalized(source);
        let medium = normalized(medium);
        let referrer = normalized(referrer);
        let domain = normalized(referrer_domain)
            .or_else(|| referrer.as_deref().and_then(self::referrer_domain));

        let src = source.as_deref().unwrap_or("");
        let med = medium.as_deref().unwrap_or("");
        let dom = domain.as_deref().unwrap_or("");

        let has_referrer = referrer.is_some() || domain.is_some();
        let self_referral = !dom.is_empty() && self.is_site_domain(dom);
        let external_referrer = has_referrer && !self_referral;

        // 1. Direct: nothing external brought the visitor here and no
        //    campaign tag says otherwise.
        let tagged_medium = !med.is_empty() && !UNTAGGED_MEDIUMS.contains(&med);
        let tagged_source = !src.is_empty() && src != "direct" && !self.is_site_domain(src);
        if !external_referrer && !tagged_medium && !tagged_source {
            return MarketingChannel::Direct;
        }

        // 2. Paid search. A bare "paid" only counts when it is not one of the
        //    paid social spellings, which rule 5 owns.
        let paid_social = contains_any(med, PAID_SOCIAL_TAGS);
        let paid_medium = med.contains("paid") && !paid_social;
        if contains_any(med, PAID_SEARCH_MEDIUMS)
            || paid_medium
            || contains_any(src, PAID_SEARCH_SOURCES)
        {
            return MarketingChannel::PaidSearch;
        }

        // 3. Organic search.
        if contains_any(dom, SEARCH_ENGINES) {
            return MarketingChannel::OrganicSearch;
        }

        // 4. Email.
        if contains_any(med, EMAIL_MARKERS) || contains_any(src, EMAIL_MARKERS) {
            return MarketingChannel::Email;
        }

        // 5. Paid social.
        if paid_social || contains_any(med, PAID_SOCIAL_MEDIUMS) {
            return MarketingChannel::PaidSocial;
        }

        // 6. Organic social.
        if contains_any(dom, SOCIAL_PLATFORMS)
            || contains_any(src, SOCIAL_PLATFORMS)
            || med.contains("social")
        {
            return MarketingChannel::OrganicSocial;
        }

        // 7. Display.
        if contains_any(med, DISPLAY_MEDIUMS) {
            return MarketingChannel::Display;
        }

        // 8. Affiliate.
        if med.contains("affiliate") || src.contains("affiliate") {
            return MarketingChannel::Affiliate;
        }

        // 9. Referral.
        if external_referrer {
            return MarketingChannel::Referral;
        }

        MarketingChannel::Other
    }
}

/// Classify with no site domains configured.
pub fn classify_channel(
    source: Option<&str>,
    medium: Option<&str>,
    referrer: Option<&str>,
    referrer_domain: Option<&str>,
) -> MarketingChannel {
    ChannelClassifier::default().classify(source, medium, referrer, referrer_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_referrer_is_direct() {
        assert_eq!(classify_channel(None, None, None, None), MarketingChannel::Direct);
        assert_eq!(
            classify_channel(Some("direct"), Some("none"), Some(""), None),
            MarketingChannel::Direct
        );
    }

    #[test]
    fn test_self_referral_is_direct() {
        let classifier = ChannelClassifier::new(["example.com"]);
        let channel = classifier.classify(
            Some("www.example.com"),
            Some("referral"),
            Some("https://www.example.com/pricing"),
            Some("www.example.com"),
        );
        assert_eq!(channel, MarketingChannel::Direct);
    }

    #[test]
    fn test_paid_search_precedes_organic() {
        let channel = classify_channel(Some("google"), Some("cpc"), None, Some("google.com"));
        assert_eq!(channel, MarketingChannel::PaidSearch);

        let channel = classify_channel(Some("Google Ads"), None, Some("https://google.com"), None);
        assert_eq!(channel, MarketingChannel::PaidSearch);
    }

    #[test]
    fn test_organic_search_from_referrer() {
        let channel = classify_channel(
            Some("www.google.com"),
            Some("referral"),
            Some("https://www.google.com/"),
            None,
        );
        assert_eq!(channel, MarketingChannel::OrganicSearch);
        assert_eq!(
            classify_channel(None, None, None, Some("duckduckgo.com")),
            MarketingChannel::OrganicSearch
        );
    }

    #[test]
    fn test_email_without_referrer() {
        assert_eq!(
            classify_channel(Some("newsletter"), Some("email"), None, None),
            MarketingChannel::Email
        );
        assert_eq!(
            classify_channel(Some("Weekly-Newsletter"), None, None, None),
            MarketingChannel::Email
        );
    }

    #[test]
    fn test_social_rules() {
        assert_eq!(
            classify_channel(Some("facebook"), Some("paid-social"), None, None),
            MarketingChannel::PaidSocial
        );
        assert_eq!(
            classify_channel(Some("facebook"), Some("cpm"), None, None),
            MarketingChannel::PaidSocial
        );
        assert_eq!(
            classify_channel(None, None, Some("https://www.linkedin.com/feed/"), None),
            MarketingChannel::OrganicSocial
        );
        assert_eq!(
            classify_channel(Some("partner"), Some("social"), None, None),
            MarketingChannel::OrganicSocial
        );
    }

    #[test]
    fn test_paid_social_spellings() {
        for medium in [
            "paid-social",
            "paid_social",
            "paidsocial",
            "Paid Social",
            "social-paid",
            "social_paid",
            "socialpaid",
        ] {
            assert_eq!(
                classify_channel(
                    Some("facebook"),
                    Some(medium),
                    Some("https://l.facebook.com/"),
                    None
                ),
                MarketingChannel::PaidSocial,
                "medium {}",
                medium
            );
        }
        // Any other paid medium is still paid search.
        assert_eq!(
            classify_channel(Some("partner"), Some("paid"), None, None),
            MarketingChannel::PaidSearch
        );
        assert_eq!(
            classify_channel(Some("facebook"), Some("social"), None, None),
            MarketingChannel::OrganicSocial
        );
    }

    #[test]
    fn test_display_and_affiliate() {
        assert_eq!(
            classify_channel(Some("adnetwork"), Some("banner"), None, None),
            MarketingChannel::Display
        );
        assert_eq!(
            classify_channel(Some("partner-site"), Some("affiliate"), None, None),
            MarketingChannel::Affiliate
        );
    }

    #[test]
    fn test_referral_and_other() {
        assert_eq!(
            classify_channel(
                Some("news.ycombinator.com"),
                Some("referral"),
                Some("https://news.ycombinator.com/item?id=1"),
                None
            ),
            MarketingChannel::Referral
        );
        assert_eq!(
            classify_channel(Some("podcast"), Some("audio"), None, None),
            MarketingChannel::Other
        );
    }

    #[test]
    fn test_deterministic() {
        let first = classify_channel(Some("Bing"), Some("CPC"), None, None);
        for _ in 0..10 {
            assert_eq!(classify_channel(Some("Bing"), Some("CPC"), None, None), first);
        }
        assert!(MarketingChannel::ALL.contains(&first));
    }

    #[test]
    fn test_referrer_domain_parsing() {
        assert_eq!(
            referrer_domain("https://WWW.Google.com/search?q=x").as_deref(),
            Some("www.google.com")
        );
        assert_eq!(referrer_domain("not a url"), None);
        assert_eq!(referrer_domain(""), None);
    }

    #[test]
    fn test_channel_wire_names() {
        for channel in MarketingChannel::ALL {
            let json = serde_json::to_string(&channel).unwrap();
            assert_eq!(json, format!("\"{}\"", channel.as_str()));
        }
    }
}
