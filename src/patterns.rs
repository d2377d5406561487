//! Classification pattern tables
//!
//! Detectors never hard-code URL or selector vocabularies. Every
//! classification (what counts as a CTA, a product page, a funnel stage, ...)
//! is a named, ordered table of regular expressions that can be replaced from
//! configuration. Matching is always case-insensitive.
//!
//! The built-in tables carry the English and Czech storefront vocabulary the
//! recorder was first deployed against.

use crate::error::AnalysisError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Built-in pattern set, compiled once
static DEFAULT_PATTERNS: Lazy<Patterns> = Lazy::new(|| {
    Patterns::compile(&PatternConfig::default())
        .expect("built-in pattern tables are valid regular expressions")
});

/// One named pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Rule name, used in error messages and logs
    pub name: String,
    /// Regular expression source
    pub pattern: String,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Conversion funnel stage names, in funnel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Landing,
    Product,
    Cart,
    Checkout,
    ThankYou,
}

/// A funnel stage and the URL pattern that identifies it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelRule {
    pub stage: FunnelStage,
    pub pattern: String,
}

/// Serializable pattern configuration.
///
/// Each field is an ordered list of rules; a value matches the table when any
/// rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Call-to-action elements (selector text)
    pub cta: Vec<PatternRule>,
    /// Pricing pages (URL)
    pub pricing: Vec<PatternRule>,
    /// Product detail pages (URL)
    pub product_page: Vec<PatternRule>,
    /// Add-to-cart actions (selector + event name)
    pub cart_action: Vec<PatternRule>,
    /// Cart-related custom event names
    pub cart_event: Vec<PatternRule>,
    /// Cart activity counted toward conversion (selector + event name)
    pub cart_activity: Vec<PatternRule>,
    /// Conversion-critical exit pages (URL)
    pub conversion_page: Vec<PatternRule>,
    /// Navigational controls, anchored at the start of the selector
    pub nav_prefix: Vec<PatternRule>,
    /// Navigational controls, anywhere in the selector
    pub nav_token: Vec<PatternRule>,
    /// Funnel stages in order; each contributes once to the conversion score
    pub funnel: Vec<FunnelRule>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            cta: vec![
                PatternRule::new("button", r"button|btn"),
                PatternRule::new("cta", r"cta"),
                PatternRule::new("submit", r"submit"),
                PatternRule::new("purchase", r"buy|koupit|add.to.cart|checkout|objednat"),
                PatternRule::new("signup", r"sign.?up|register"),
            ],
            pricing: vec![PatternRule::new("pricing", r"pricing|cena|price|tarif")],
            product_page: vec![PatternRule::new(
                "product",
                r"product|produkt|katalog|item|detail",
            )],
            cart_action: vec![PatternRule::new(
                "add_to_cart",
                r"add.to.cart|addtocart|do.kosiku|pridat",
            )],
            cart_event: vec![PatternRule::new("cart_event", r"cart|kosik")],
            cart_activity: vec![PatternRule::new(
                "cart_activity",
                r"cart|kosik|add.to.cart|pridat",
            )],
            conversion_page: vec![
                PatternRule::new("cart", r"cart|kosik"),
                PatternRule::new("checkout", r"checkout|pokladna|order|objednavka"),
                PatternRule::new("product", r"product|produkt"),
            ],
            nav_prefix: vec![PatternRule::new(
                "nav_tag",
                r#"^(a|button|input\[type="submit"\])"#,
            )],
            nav_token: vec![PatternRule::new("nav_class", r"link|btn|button")],
            funnel: vec![
                FunnelRule {
                    stage: FunnelStage::Landing,
                    pattern: r"^/$|home|landing".to_string(),
                },
                FunnelRule {
                    stage: FunnelStage::Product,
                    pattern: r"product|produkt|katalog|item|detail".to_string(),
                },
                FunnelRule {
                    stage: FunnelStage::Cart,
                    pattern: r"cart|kosik|basket".to_string(),
                },
                FunnelRule {
                    stage: FunnelStage::Checkout,
                    pattern: r"checkout|pokladna|order|objednavka".to_string(),
                },
                FunnelRule {
                    stage: FunnelStage::ThankYou,
                    pattern: r"thank|dekujeme|success|complete".to_string(),
                },
            ],
        }
    }
}

impl PatternConfig {
    /// Parse a pattern configuration from JSON; missing tables keep defaults
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A compiled, ordered pattern table
#[derive(Debug, Clone)]
pub struct PatternTable {
    rules: Vec<(String, Regex)>,
}

impl PatternTable {
    fn compile(rules: &[PatternRule]) -> Result<Self, AnalysisError> {
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.name.clone(), build_regex(&rule.name, &rule.pattern)?)))
            .collect::<Result<Vec<_>, AnalysisError>>()?;
        Ok(Self { rules })
    }

    /// True when any rule matches
    pub fn is_match(&self, text: &str) -> bool {
        self.rules.iter().any(|(_, re)| re.is_match(text))
    }

    /// Name of the first matching rule
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compiled pattern set handed to detectors and the scorer
#[derive(Debug, Clone)]
pub struct Patterns {
    pub cta: PatternTable,
    pub pricing: PatternTable,
    pub product_page: PatternTable,
    pub cart_action: PatternTable,
    pub cart_event: PatternTable,
    pub cart_activity: PatternTable,
    pub conversion_page: PatternTable,
    pub nav_prefix: PatternTable,
    pub nav_token: PatternTable,
    pub funnel: Vec<(FunnelStage, Regex)>,
}

impl Patterns {
    /// Compile a configuration; fails on the first invalid expression
    pub fn compile(config: &PatternConfig) -> Result<Self, AnalysisError> {
        let funnel = config
            .funnel
            .iter()
            .map(|rule| {
                let name = format!("funnel.{:?}", rule.stage).to_lowercase();
                Ok((rule.stage, build_regex(&name, &rule.pattern)?))
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(Self {
            cta: PatternTable::compile(&config.cta)?,
            pricing: PatternTable::compile(&config.pricing)?,
            product_page: PatternTable::compile(&config.product_page)?,
            cart_action: PatternTable::compile(&config.cart_action)?,
            cart_event: PatternTable::compile(&config.cart_event)?,
            cart_activity: PatternTable::compile(&config.cart_activity)?,
            conversion_page: PatternTable::compile(&config.conversion_page)?,
            nav_prefix: PatternTable::compile(&config.nav_prefix)?,
            nav_token: PatternTable::compile(&config.nav_token)?,
            funnel,
        })
    }

    /// Shared built-in pattern set
    pub fn builtin() -> &'static Patterns {
        &DEFAULT_PATTERNS
    }

    /// Product detail page URL
    pub fn is_product_page(&self, url: &str) -> bool {
        self.product_page.is_match(url)
    }

    /// Selector looks like a link or button
    pub fn is_navigational(&self, selector: &str) -> bool {
        self.nav_prefix.is_match(selector) || self.nav_token.is_match(selector)
    }

    /// Funnel stages reached by any of the given URLs, each at most once
    pub fn funnel_stages_reached<'a, I>(&self, urls: I) -> Vec<FunnelStage>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.funnel
            .iter()
            .filter(|(_, re)| urls.clone().into_iter().any(|u| re.is_match(u)))
            .map(|(stage, _)| *stage)
            .collect()
    }
}

fn build_regex(name: &str, pattern: &str) -> Result<Regex, AnalysisError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| AnalysisError::InvalidPattern {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_compile() {
        let patterns = Patterns::builtin();
        assert_eq!(patterns.funnel.len(), 5);
        assert!(!patterns.cta.is_empty());
    }

    #[test]
    fn test_cta_matching_is_case_insensitive() {
        let patterns = Patterns::builtin();
        assert!(patterns.cta.is_match("BUTTON.primary"));
        assert!(patterns.cta.is_match("a.Sign-Up"));
        assert!(patterns.cta.is_match("#add_to_cart"));
        assert_eq!(patterns.cta.first_match("div.btn-koupit"), Some("button"));
        assert!(!patterns.cta.is_match("div.hero-image"));
    }

    #[test]
    fn test_navigational_selectors() {
        let patterns = Patterns::builtin();
        assert!(patterns.is_navigational("a.nav-item"));
        assert!(patterns.is_navigational(r#"input[type="submit"]"#));
        assert!(patterns.is_navigational("span.link-text"));
        assert!(!patterns.is_navigational("div.hero > img"));
        assert!(!patterns.is_navigational(""));
    }

    #[test]
    fn test_funnel_stages_count_once() {
        let patterns = Patterns::builtin();
        let urls = ["/", "/product/1", "/product/2", "/cart", "/thank-you"];
        let stages = patterns.funnel_stages_reached(urls.iter().copied());
        assert_eq!(
            stages,
            vec![
                FunnelStage::Landing,
                FunnelStage::Product,
                FunnelStage::Cart,
                FunnelStage::ThankYou
            ]
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = PatternConfig::from_json(r#"{ "pricing": [{ "name": "plans", "pattern": "plans" }] }"#)
            .unwrap();
        assert_eq!(config.pricing.len(), 1);
        assert_eq!(config.cta, PatternConfig::default().cta);

        let patterns = Patterns::compile(&config).unwrap();
        assert!(patterns.pricing.is_match("/plans"));
        assert!(!patterns.pricing.is_match("/pricing"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut config = PatternConfig::default();
        config.cta.push(PatternRule::new("broken", "(unclosed"));
        let err = Patterns::compile(&config).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPattern { ref name, .. } if name == "broken"));
    }
}
