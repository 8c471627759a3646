///! Role, purpose and business-context classification

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use resilience_core_types::ElementSnapshot;

use crate::keywords::KeywordExtractor;
use crate::models::*;

static BUTTON_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|[-_])(btn|button|cta)([-_]|$)").unwrap());
static LINK_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(^|[-_])(link|anchor)([-_]|$)").unwrap());
static INPUT_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|[-_])(input|field|textbox)([-_]|$)").unwrap());
static NAV_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|[-_])(nav|navbar|breadcrumb)([-_]|$)").unwrap());
static MENU_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(^|[-_])(menu|dropdown)([-_]|$)").unwrap());
static TAB_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(^|[-_])tabs?([-_]|$)").unwrap());

static BUTTON_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(submit|save|continue|next|ok|apply|confirm|send|buy|add to cart|sign in|log ?in|sign up|register|delete|remove|cancel)\b").unwrap()
});
static LINK_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(click here|learn more|read more|view (all|more|details)|see more)\b").unwrap());

static SEARCH_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(search|find|query|lookup)\b").unwrap());
static SUBMIT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(submit|send|save|confirm|apply|continue|place order)\b").unwrap());
static AUTH_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(log ?in|log ?out|sign ?in|sign ?out|password|username|auth|otp)\b").unwrap()
});
static DESTRUCTIVE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(delete|remove|destroy|discard|erase|unsubscribe)\b").unwrap());
static CHECKOUT_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(checkout|cart|basket|buy|purchase|order|payment|pay|shipping|billing)\b").unwrap()
});
static REGISTRATION_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(sign ?up|register|create account|join)\b").unwrap());
static SETTINGS_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(settings|preferences|profile|account|options)\b").unwrap());

/// Purpose confidence starts here and grows per signal
const BASE_PURPOSE_CONFIDENCE: f64 = 0.4;
const TAG_CONFIDENCE_STEP: f64 = 0.15;

/// Element context analyzer
#[derive(Clone, Default)]
pub struct ContextAnalyzer {
    keywords: KeywordExtractor,
}

impl ContextAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(&self, element: &ElementSnapshot) -> SemanticContext {
        let role = self.classify_role(element);
        let interaction = role.interaction();
        let haystack = haystack(element);
        let purpose = self.infer_purpose(element, role, &haystack);
        let keywords = self.keywords.extract(element);
        let business_context = detect_business_context(&haystack, element.parent.as_deref());

        SemanticContext {
            role,
            interaction,
            purpose,
            keywords,
            business_context,
        }
    }

    /// Tag first, then ARIA role, class names, visible text
    pub fn classify_role(&self, element: &ElementSnapshot) -> ElementRole {
        if let Some(role) = role_from_tag(element) {
            return role;
        }
        if let Some(role) = element.role.as_deref().and_then(ElementRole::from_aria) {
            return role;
        }
        if let Some(role) = role_from_classes(&element.classes) {
            return role;
        }
        role_from_text(&element.text).unwrap_or(ElementRole::Unknown)
    }

    fn infer_purpose(&self, element: &ElementSnapshot, role: ElementRole, haystack: &str) -> Purpose {
        let mut tags = BTreeSet::new();

        match role.interaction() {
            InteractionType::Click | InteractionType::Submit => {
                tags.insert(PurposeTag::ActionTrigger);
            }
            InteractionType::Navigate => {
                tags.insert(PurposeTag::Navigation);
            }
            InteractionType::Type
            | InteractionType::Select
            | InteractionType::Toggle
            | InteractionType::Upload => {
                tags.insert(PurposeTag::DataEntry);
            }
            InteractionType::None => {}
        }

        let is_submit_input = element.tag == "input"
            && matches!(element.input_type.as_deref(), Some("submit") | Some("image"));
        if is_submit_input
            || role == ElementRole::Form
            || (role == ElementRole::Button && SUBMIT_WORDS.is_match(haystack))
        {
            tags.insert(PurposeTag::FormSubmission);
        }
        if SEARCH_WORDS.is_match(haystack) || element.input_type.as_deref() == Some("search") {
            tags.insert(PurposeTag::Search);
        }
        if AUTH_WORDS.is_match(haystack) || element.input_type.as_deref() == Some("password") {
            tags.insert(PurposeTag::Authentication);
        }
        if DESTRUCTIVE_WORDS.is_match(haystack) {
            tags.insert(PurposeTag::Destructive);
        }

        let mut confidence = if role == ElementRole::Unknown {
            0.0
        } else {
            BASE_PURPOSE_CONFIDENCE
        };
        confidence += TAG_CONFIDENCE_STEP * tags.len() as f64;

        Purpose {
            primary: role,
            tags,
            confidence: confidence.min(1.0),
        }
    }
}

fn role_from_tag(element: &ElementSnapshot) -> Option<ElementRole> {
    Some(match element.tag.as_str() {
        "button" => ElementRole::Button,
        "a" if element.href.is_some() => ElementRole::Link,
        "select" => ElementRole::Select,
        "textarea" => ElementRole::TextArea,
        "form" => ElementRole::Form,
        "nav" => ElementRole::Navigation,
        "img" | "svg" => ElementRole::Image,
        "dialog" => ElementRole::Dialog,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => ElementRole::Heading,
        "input" => match element.input_type.as_deref().unwrap_or("text") {
            "submit" | "button" | "reset" | "image" => ElementRole::Button,
            "checkbox" => ElementRole::Checkbox,
            "radio" => ElementRole::Radio,
            "file" => ElementRole::FileInput,
            "hidden" => return None,
            _ => ElementRole::TextInput,
        },
        _ => return None,
    })
}

fn role_from_classes(classes: &[String]) -> Option<ElementRole> {
    let table: [(&Lazy<Regex>, ElementRole); 6] = [
        (&BUTTON_CLASS, ElementRole::Button),
        (&LINK_CLASS, ElementRole::Link),
        (&INPUT_CLASS, ElementRole::TextInput),
        (&NAV_CLASS, ElementRole::Navigation),
        (&MENU_CLASS, ElementRole::Menu),
        (&TAB_CLASS, ElementRole::Tab),
    ];
    table
        .iter()
        .find(|(re, _)| classes.iter().any(|c| re.is_match(c)))
        .map(|(_, role)| *role)
}

fn role_from_text(text: &str) -> Option<ElementRole> {
    if BUTTON_TEXT.is_match(text) {
        Some(ElementRole::Button)
    } else if LINK_TEXT.is_match(text) {
        Some(ElementRole::Link)
    } else {
        None
    }
}

/// Every human-facing string of the element, space separated
fn haystack(element: &ElementSnapshot) -> String {
    let mut parts: Vec<&str> = vec![element.text.as_str()];
    parts.extend(
        [
            element.aria_label.as_deref(),
            element.title.as_deref(),
            element.placeholder.as_deref(),
            element.name.as_deref(),
            element.id.as_deref(),
            element.href.as_deref(),
        ]
        .into_iter()
        .flatten(),
    );
    parts.extend(element.classes.iter().map(String::as_str));
    parts.join(" ").replace(['-', '_'], " ")
}

/// Most specific business flow mentioned by the element or its parent
pub fn detect_business_context(haystack: &str, parent: Option<&str>) -> BusinessContext {
    let text = match parent {
        Some(parent) => format!("{haystack} {}", parent.replace(['-', '_', '#', '.'], " ")),
        None => haystack.to_string(),
    };
    if CHECKOUT_WORDS.is_match(&text) {
        BusinessContext::Checkout
    } else if REGISTRATION_WORDS.is_match(&text) {
        BusinessContext::Registration
    } else if AUTH_WORDS.is_match(&text) {
        BusinessContext::Authentication
    } else if SEARCH_WORDS.is_match(&text) {
        BusinessContext::Search
    } else if SETTINGS_WORDS.is_match(&text) {
        BusinessContext::Settings
    } else if NAV_CLASS.is_match(&text) || text.contains("menu") {
        BusinessContext::Navigation
    } else if text.trim().is_empty() {
        BusinessContext::Unknown
    } else {
        BusinessContext::Content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience_core_types::fake::element;

    #[test]
    fn test_tag_wins_over_aria() {
        let analyzer = ContextAnalyzer::new();
        let mut el = element("b", "button");
        el.role = Some("link".into());
        assert_eq!(analyzer.classify_role(&el), ElementRole::Button);
    }

    #[test]
    fn test_aria_then_class_then_text() {
        let analyzer = ContextAnalyzer::new();

        let mut aria = element("d1", "div");
        aria.role = Some("checkbox".into());
        aria.classes = vec!["btn".into()];
        assert_eq!(analyzer.classify_role(&aria), ElementRole::Checkbox);

        let mut class = element("d2", "div");
        class.classes = vec!["primary-btn".into()];
        class.text = "Read more".into();
        assert_eq!(analyzer.classify_role(&class), ElementRole::Button);

        let mut text = element("d3", "span");
        text.text = "Learn more about plans".into();
        assert_eq!(analyzer.classify_role(&text), ElementRole::Link);

        assert_eq!(analyzer.classify_role(&element("d4", "div")), ElementRole::Unknown);
    }

    #[test]
    fn test_submit_button_purpose() {
        let analyzer = ContextAnalyzer::new();
        let mut el = element("b", "button");
        el.text = "Submit order".into();
        el.parent = Some("form#checkout".into());
        let ctx = analyzer.analyze(&el);
        assert_eq!(ctx.interaction, InteractionType::Click);
        assert!(ctx.purpose.tags.contains(&PurposeTag::ActionTrigger));
        assert!(ctx.purpose.tags.contains(&PurposeTag::FormSubmission));
        assert!(ctx.purpose.confidence <= 1.0);
        assert_eq!(ctx.business_context, BusinessContext::Checkout);
    }

    #[test]
    fn test_password_field_is_authentication() {
        let analyzer = ContextAnalyzer::new();
        let mut el = element("p", "input");
        el.input_type = Some("password".into());
        el.name = Some("user_password".into());
        let ctx = analyzer.analyze(&el);
        assert_eq!(ctx.role, ElementRole::TextInput);
        assert!(ctx.purpose.tags.contains(&PurposeTag::DataEntry));
        assert!(ctx.purpose.tags.contains(&PurposeTag::Authentication));
        assert_eq!(ctx.business_context, BusinessContext::Authentication);
    }

    #[test]
    fn test_file_input_is_upload() {
        let analyzer = ContextAnalyzer::new();
        let mut el = element("f", "input");
        el.input_type = Some("file".into());
        el.name = Some("attachment".into());
        let ctx = analyzer.analyze(&el);
        assert_eq!(ctx.role, ElementRole::FileInput);
        assert_eq!(ctx.interaction, InteractionType::Upload);
        assert!(ctx.purpose.tags.contains(&PurposeTag::DataEntry));

        let mut text = element("t", "input");
        text.input_type = Some("text".into());
        assert_ne!(analyzer.analyze(&text).interaction, InteractionType::Upload);
    }

    #[test]
    fn test_confidence_is_capped() {
        let analyzer = ContextAnalyzer::new();
        let mut el = element("x", "button");
        el.text = "Delete account and sign in to search, then submit".into();
        let ctx = analyzer.analyze(&el);
        assert!(ctx.purpose.tags.len() >= 5);
        assert_eq!(ctx.purpose.confidence, 1.0);
    }
}
