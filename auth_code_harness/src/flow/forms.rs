//! Login and consent page model.
//!
//! The interactive pages of the authorization server are plain HTML forms. This module pulls
//! the forms out of a page, classifies the page, and fills the forms the way a user clicking
//! through them would.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::LoginCredentials;
use crate::scope::ScopeSet;

static FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form\s*>").expect("form regex is valid")
});

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(input|button)\b([^>]*)>").expect("field regex is valid")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute regex is valid")
});

pub(crate) const SCOPE_FIELD: &str = "grant_scope";
const REMEMBER_FIELD: &str = "remember";
const ACCEPT_ID: &str = "accept";
const USERNAME_NAMES: [&str; 4] = ["email", "username", "login", "user"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Hidden,
    Text,
    Email,
    Password,
    Checkbox,
    Radio,
    Submit,
    Other(String),
}

impl FieldKind {
    fn from_type(element: &str, input_type: Option<&str>) -> Self {
        match (element, input_type.map(str::to_ascii_lowercase).as_deref()) {
            ("button", None | Some("submit")) => Self::Submit,
            ("button", Some(other)) => Self::Other(other.to_string()),
            (_, None | Some("text")) => Self::Text,
            (_, Some("hidden")) => Self::Hidden,
            (_, Some("email")) => Self::Email,
            (_, Some("password")) => Self::Password,
            (_, Some("checkbox")) => Self::Checkbox,
            (_, Some("radio")) => Self::Radio,
            (_, Some("submit")) => Self::Submit,
            (_, Some(other)) => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub kind: FieldKind,
    pub name: Option<String>,
    pub id: Option<String>,
    pub value: String,
    pub checked: bool,
}

impl FormField {
    fn named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone)]
pub struct HtmlForm {
    pub action: Url,
    pub method: FormMethod,
    pub fields: Vec<FormField>,
}

/// What the browser is currently looking at
#[derive(Debug, Clone)]
pub enum PageKind {
    Login(HtmlForm),
    Consent(HtmlForm),
    Other,
}

impl PageKind {
    pub fn classify(page_url: &Url, body: &str) -> Self {
        let forms = parse_forms(page_url, body);

        if let Some(form) = forms
            .iter()
            .find(|f| f.fields.iter().any(|field| field.kind == FieldKind::Password))
        {
            return Self::Login(form.clone());
        }

        if let Some(form) = forms.iter().find(|f| {
            f.fields.iter().any(|field| field.named(SCOPE_FIELD))
                || f.action.path().trim_end_matches('/').ends_with("/consent")
        }) {
            return Self::Consent(form.clone());
        }

        Self::Other
    }
}

/// Extracts every form of an HTML page, resolving actions against the page URL
pub fn parse_forms(page_url: &Url, body: &str) -> Vec<HtmlForm> {
    FORM_RE
        .captures_iter(body)
        .map(|captures| {
            let attrs = parse_attributes(captures.get(1).map_or("", |m| m.as_str()));
            let inner = captures.get(2).map_or("", |m| m.as_str());

            let action = attr(&attrs, "action")
                .filter(|a| !a.trim().is_empty())
                .and_then(|a| page_url.join(a.trim()).ok())
                .unwrap_or_else(|| page_url.clone());
            let method = match attr(&attrs, "method").map(str::to_ascii_lowercase).as_deref() {
                Some("post") => FormMethod::Post,
                _ => FormMethod::Get,
            };

            let fields = FIELD_RE
                .captures_iter(inner)
                .map(|field| {
                    let element = field
                        .get(1)
                        .map_or("input", |m| m.as_str())
                        .to_ascii_lowercase();
                    let attrs = parse_attributes(field.get(2).map_or("", |m| m.as_str()));
                    FormField {
                        kind: FieldKind::from_type(&element, attr(&attrs, "type")),
                        name: attr(&attrs, "name").map(str::to_string),
                        id: attr(&attrs, "id").map(str::to_string),
                        value: attr(&attrs, "value").unwrap_or_default().to_string(),
                        checked: attrs.iter().any(|(name, _)| name == "checked"),
                    }
                })
                .collect();

            HtmlForm {
                action,
                method,
                fields,
            }
        })
        .collect()
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|captures| {
            let name = captures.get(1)?.as_str().to_ascii_lowercase();
            let value = captures
                .get(2)
                .or_else(|| captures.get(3))
                .or_else(|| captures.get(4))
                .map_or(String::new(), |m| decode_entities(m.as_str()));
            Some((name, value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

pub(crate) fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

impl HtmlForm {
    /// Scope values offered as consent checkboxes
    pub fn offered_scopes(&self) -> ScopeSet {
        self.fields
            .iter()
            .filter(|f| f.named(SCOPE_FIELD))
            .map(|f| f.value.clone())
            .collect()
    }

    /// Fields for submitting the login form with the given identity
    pub fn fill_login(
        &self,
        credentials: &LoginCredentials,
        remember: bool,
    ) -> Result<Vec<(String, String)>, String> {
        let username_field = self
            .fields
            .iter()
            .find(|f| f.kind == FieldKind::Email)
            .or_else(|| {
                self.fields.iter().find(|f| {
                    f.kind == FieldKind::Text
                        && f.name
                            .as_deref()
                            .is_some_and(|n| USERNAME_NAMES.contains(&n))
                })
            })
            .and_then(|f| f.name.clone())
            .ok_or_else(|| "Login form has no username or email field".to_string())?;
        let password_field = self
            .fields
            .iter()
            .find(|f| f.kind == FieldKind::Password)
            .and_then(|f| f.name.clone())
            .ok_or_else(|| "Login form has no named password field".to_string())?;

        let mut values = self.carried_fields(remember, |f| {
            f.named(&username_field) || f.named(&password_field)
        });
        values.push((username_field, credentials.username.clone()));
        values.push((password_field, credentials.password.clone()));
        values.extend(self.accept_button());
        Ok(values)
    }

    /// Fields for approving exactly `granted`.
    ///
    /// Checkboxes for scopes outside `granted` stay unticked even when pre-checked. A granted
    /// scope without a checkbox on the page is an error.
    pub fn fill_consent(
        &self,
        granted: &ScopeSet,
        remember: bool,
    ) -> Result<Vec<(String, String)>, String> {
        let offered = self.offered_scopes();
        if let Some(missing) = granted.iter().find(|s| !offered.contains(s)) {
            return Err(format!(
                "Scope `{missing}` is not offered on the consent page (offered: [{offered}])"
            ));
        }

        let mut values = self.carried_fields(remember, |f| f.named(SCOPE_FIELD));
        values.extend(
            offered
                .iter()
                .filter(|s| granted.contains(s))
                .map(|s| (SCOPE_FIELD.to_string(), s.to_string())),
        );
        values.extend(self.accept_button());
        Ok(values)
    }

    /// Hidden and text fields keep their values, checkboxes follow their `checked` state,
    /// except the remember box which follows `remember`.
    fn carried_fields(
        &self,
        remember: bool,
        skip: impl Fn(&FormField) -> bool,
    ) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|f| !skip(f))
            .filter_map(|f| {
                let name = f.name.clone()?;
                let include = match f.kind {
                    FieldKind::Hidden | FieldKind::Text | FieldKind::Email => true,
                    FieldKind::Checkbox if name == REMEMBER_FIELD => remember,
                    FieldKind::Checkbox | FieldKind::Radio => f.checked,
                    _ => false,
                };
                let value = match (&f.kind, f.value.is_empty()) {
                    (FieldKind::Checkbox | FieldKind::Radio, true) => "on".to_string(),
                    _ => f.value.clone(),
                };
                include.then_some((name, value))
            })
            .collect()
    }

    fn accept_button(&self) -> Option<(String, String)> {
        let submits = || self.fields.iter().filter(|f| f.kind == FieldKind::Submit);
        submits()
            .find(|f| f.id.as_deref() == Some(ACCEPT_ID))
            .or_else(|| submits().next())
            .and_then(|f| Some((f.name.clone()?, f.value.clone())))
    }
}
