use serde::Serialize;

/// Stable error codes returned to API clients. Frontends key their own
/// translations on these, so the strings never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    ApiAuthenticationFailed,
    FirebaseRoleForbidden,
}

impl MessageCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCode::ApiAuthenticationFailed => "api_authentication_failed",
            MessageCode::FirebaseRoleForbidden => "firebase_role_forbidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    /// Accepts `fr`, `fr-FR`, `fr_CA` and so on. Anything unknown is English.
    pub fn parse(tag: &str) -> Self {
        let lang = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match lang.as_str() {
            "fr" => Locale::Fr,
            _ => Locale::En,
        }
    }
}

pub fn message(locale: Locale, code: MessageCode) -> &'static str {
    match (locale, code) {
        (Locale::En, MessageCode::ApiAuthenticationFailed) => {
            "Authentication failed. Please sign in again."
        }
        (Locale::En, MessageCode::FirebaseRoleForbidden) => {
            "Your role does not allow this operation."
        }
        (Locale::Fr, MessageCode::ApiAuthenticationFailed) => {
            "Échec de l'authentification. Veuillez vous reconnecter."
        }
        (Locale::Fr, MessageCode::FirebaseRoleForbidden) => {
            "Votre rôle ne permet pas cette opération."
        }
    }
}

/// JSON body of a 401/403 API answer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: &'static str,
}

impl ErrorBody {
    pub fn new(locale: Locale, code: MessageCode) -> Self {
        Self {
            code: code.as_str(),
            message: message(locale, code),
        }
    }
}
