///! Data models for semantic analysis
use std::collections::BTreeSet;

use resilience_core_types::ElementSnapshot;
use serde::{Deserialize, Serialize};

/// What an element is, independent of how it is styled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementRole {
    Button,
    Link,
    TextInput,
    FileInput,
    Checkbox,
    Radio,
    Select,
    TextArea,
    Form,
    Navigation,
    Menu,
    MenuItem,
    Tab,
    Heading,
    Image,
    Dialog,
    Unknown,
}

impl ElementRole {
    /// Map an ARIA role attribute
    pub fn from_aria(role: &str) -> Option<Self> {
        Some(match role.trim().to_ascii_lowercase().as_str() {
            "button" => Self::Button,
            "link" => Self::Link,
            "textbox" | "searchbox" | "combobox" | "spinbutton" => Self::TextInput,
            "checkbox" | "switch" => Self::Checkbox,
            "radio" => Self::Radio,
            "listbox" => Self::Select,
            "form" | "search" => Self::Form,
            "navigation" => Self::Navigation,
            "menu" | "menubar" => Self::Menu,
            "menuitem" | "option" => Self::MenuItem,
            "tab" => Self::Tab,
            "heading" => Self::Heading,
            "img" => Self::Image,
            "dialog" | "alertdialog" => Self::Dialog,
            _ => return None,
        })
    }

    pub fn interaction(&self) -> InteractionType {
        match self {
            Self::Button | Self::MenuItem | Self::Tab => InteractionType::Click,
            Self::Link | Self::Navigation | Self::Menu => InteractionType::Navigate,
            Self::TextInput | Self::TextArea => InteractionType::Type,
            Self::FileInput => InteractionType::Upload,
            Self::Checkbox | Self::Radio => InteractionType::Toggle,
            Self::Select => InteractionType::Select,
            Self::Form => InteractionType::Submit,
            Self::Heading | Self::Image | Self::Dialog | Self::Unknown => InteractionType::None,
        }
    }
}

/// How a user interacts with an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionType {
    Click,
    Type,
    Select,
    Toggle,
    Submit,
    Navigate,
    Upload,
    None,
}

/// Secondary purpose tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurposeTag {
    ActionTrigger,
    Search,
    FormSubmission,
    Navigation,
    Authentication,
    DataEntry,
    Destructive,
}

/// Inferred purpose of an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purpose {
    pub primary: ElementRole,
    pub tags: BTreeSet<PurposeTag>,
    /// Additive, capped at 1.0
    pub confidence: f64,
}

/// Business flow the element most likely belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusinessContext {
    Checkout,
    Authentication,
    Search,
    Registration,
    Navigation,
    Settings,
    Content,
    Unknown,
}

/// Full semantic description of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticContext {
    pub role: ElementRole,
    pub interaction: InteractionType,
    pub purpose: Purpose,
    pub keywords: BTreeSet<String>,
    pub business_context: BusinessContext,
}

/// Element scored against a target context
#[derive(Debug, Clone)]
pub struct SemanticCandidate {
    pub element: ElementSnapshot,
    pub context: SemanticContext,
    pub score: f64,
}
