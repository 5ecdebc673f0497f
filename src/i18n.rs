//! Minimal translator handed to every operation context.
//!
//! Full string tables live outside the core; this only carries the messages the
//! transports need to render classified errors.

use std::collections::HashMap;

const EN: &[(&str, &str)] = &[
    (
        "error:emailOrPasswordIncorrect",
        "The email or password provided is incorrect.",
    ),
    (
        "error:userLocked",
        "This user is locked due to having too many failed login attempts.",
    ),
    (
        "error:notAllowedToPerformAction",
        "You are not allowed to perform this action.",
    ),
    ("error:notFound", "The requested resource was not found."),
    ("error:validation", "The following field is invalid."),
    ("error:timeout", "The operation did not complete in time."),
    ("error:unknown", "An unknown error has occurred."),
    ("authentication:passed", "Auth Passed"),
    ("authentication:unlocked", "Success"),
];

const ES: &[(&str, &str)] = &[
    (
        "error:emailOrPasswordIncorrect",
        "El correo o la contraseña son incorrectos.",
    ),
    (
        "error:userLocked",
        "Este usuario está bloqueado por demasiados intentos fallidos.",
    ),
    (
        "error:notAllowedToPerformAction",
        "No tienes permiso para realizar esta acción.",
    ),
    ("error:notFound", "No se encontró el recurso solicitado."),
    ("error:validation", "El siguiente campo no es válido."),
    ("error:timeout", "La operación no terminó a tiempo."),
    ("error:unknown", "Ha ocurrido un error desconocido."),
    ("authentication:passed", "Autenticación correcta"),
    ("authentication:unlocked", "Éxito"),
];

#[derive(Clone, Debug)]
pub struct Translator {
    language: String,
    messages: HashMap<&'static str, &'static str>,
}

impl Translator {
    /// Build a translator for `language`, falling back to English for
    /// unknown languages.
    #[must_use]
    pub fn new(language: &str) -> Self {
        let (language, table) = match language {
            "es" => ("es", ES),
            _ => ("en", EN),
        };
        Self {
            language: language.to_string(),
            messages: table.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Translate `key`; unknown keys are returned verbatim.
    #[must_use]
    pub fn t(&self, key: &str) -> String {
        self.messages
            .get(key)
            .map_or_else(|| key.to_string(), |message| (*message).to_string())
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new("en")
    }
}

#[cfg(test)]
mod tests {
    use super::Translator;

    #[test]
    fn translates_known_keys() {
        let t = Translator::new("en");
        assert_eq!(t.t("authentication:passed"), "Auth Passed");
        assert_eq!(t.language(), "en");
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let t = Translator::new("fr");
        assert_eq!(t.language(), "en");
        assert_eq!(t.t("error:notFound"), "The requested resource was not found.");
    }

    #[test]
    fn unknown_key_is_returned_verbatim() {
        let t = Translator::new("es");
        assert_eq!(t.language(), "es");
        assert_eq!(t.t("custom:key"), "custom:key");
    }
}
