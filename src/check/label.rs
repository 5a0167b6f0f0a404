use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of probe outcomes, in decision order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Operational,
    RedirectsToHome,
    RequiresAuthentication,
    Forbidden,
    NotFound,
    ServerError,
    OtherHttpError(u16),
    LikelyOperationalNoResponse,
    NetworkOrDnsFailure,
    UnknownError,
}

impl Label {
    pub fn is_compliant(self) -> bool {
        matches!(self, Label::Operational)
    }

    /// Stable identifier used in summaries and logs.
    pub fn key(self) -> &'static str {
        match self {
            Label::Operational => "operational",
            Label::RedirectsToHome => "redirects_to_home",
            Label::RequiresAuthentication => "requires_authentication",
            Label::Forbidden => "forbidden",
            Label::NotFound => "not_found",
            Label::ServerError => "server_error",
            Label::OtherHttpError(_) => "other_http_error",
            Label::LikelyOperationalNoResponse => "likely_operational_no_response",
            Label::NetworkOrDnsFailure => "network_or_dns_failure",
            Label::UnknownError => "unknown_error",
        }
    }

    /// User-facing phrase for the given taxonomy.
    pub fn phrase(self, taxonomy: Taxonomy) -> String {
        match (taxonomy, self) {
            (_, Label::Operational) => OPERATIONAL_PHRASE.to_string(),
            (Taxonomy::Binary, _) => NOT_OPERATIONAL_PHRASE.to_string(),
            (Taxonomy::Full, Label::RedirectsToHome) => "Enlace dirige al Home".into(),
            (Taxonomy::Full, Label::RequiresAuthentication) => {
                "Enlace requiere autenticación de usuario".into()
            }
            (Taxonomy::Full, Label::Forbidden) => "Acceso prohibido".into(),
            (Taxonomy::Full, Label::NotFound) => "Error 404 página no operativa".into(),
            (Taxonomy::Full, Label::ServerError) => "Error del servidor (5XX)".into(),
            (Taxonomy::Full, Label::OtherHttpError(code)) => format!("Otro error HTTP: {}", code),
            (Taxonomy::Full, Label::LikelyOperationalNoResponse) => {
                "Sin respuesta; probable operatividad".into()
            }
            (Taxonomy::Full, Label::NetworkOrDnsFailure) => {
                "No se pudo acceder: problema de DNS o red".into()
            }
            (Taxonomy::Full, Label::UnknownError) => "Error desconocido".into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::OtherHttpError(code) => write!(f, "{}({})", self.key(), code),
            _ => f.write_str(self.key()),
        }
    }
}

const OPERATIONAL_PHRASE: &str = "Enlace operativo y funcional";
const NOT_OPERATIONAL_PHRASE: &str = "Enlace no operativo";

/// How finely non-compliant outcomes are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Taxonomy {
    /// Every label keeps its own phrase.
    #[default]
    Full,
    /// Operational vs. not operational.
    Binary,
}

/// One line of the results dictionary shown to users.
pub struct DictionaryEntry {
    pub phrase: &'static str,
    pub plain: &'static str,
    pub technical: &'static str,
    pub code: &'static str,
}

pub const DICTIONARY: &[DictionaryEntry] = &[
    DictionaryEntry {
        phrase: OPERATIONAL_PHRASE,
        plain: "Funciona bien y lleva al contenido.",
        technical: "HTTP 200 OK",
        code: "status == 200",
    },
    DictionaryEntry {
        phrase: "Enlace dirige al Home",
        plain: "Redirige al inicio del sitio.",
        technical: "HTTP 200 pero la URL final es '/', 'index.html' o 'home'",
        code: "final path in {\"\", \"index.html\", \"home\"}",
    },
    DictionaryEntry {
        phrase: "Enlace requiere autenticación de usuario",
        plain: "Pide inicio de sesión.",
        technical: "HTTP 401 Unauthorized",
        code: "status == 401",
    },
    DictionaryEntry {
        phrase: "Acceso prohibido",
        plain: "El acceso está bloqueado.",
        technical: "HTTP 403 Forbidden, o portal con aviso de acceso denegado",
        code: "status == 403",
    },
    DictionaryEntry {
        phrase: "Error 404 página no operativa",
        plain: "La página no existe.",
        technical: "HTTP 404 Not Found",
        code: "status == 404",
    },
    DictionaryEntry {
        phrase: "Error del servidor (5XX)",
        plain: "El sitio tiene fallas internas.",
        technical: "HTTP 5XX",
        code: "status >= 500",
    },
    DictionaryEntry {
        phrase: "Otro error HTTP",
        plain: "Ocurrió un error no identificado.",
        technical: "Códigos 2XX-4XX no clasificados",
        code: "other status",
    },
    DictionaryEntry {
        phrase: "Sin respuesta; probable operatividad",
        plain: "No hubo respuesta, pero no falló del todo.",
        technical: "Timeout sin respuesta",
        code: "reqwest::Error::is_timeout()",
    },
    DictionaryEntry {
        phrase: "No se pudo acceder: problema de DNS o red",
        plain: "Error técnico al resolver el dominio.",
        technical: "Error de red o DNS",
        code: "reqwest::Error::is_connect()",
    },
    DictionaryEntry {
        phrase: "Error desconocido",
        plain: "No se puede identificar el problema.",
        technical: "Excepción no controlada",
        code: "any other error",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_full() {
        assert_eq!(Label::NotFound.phrase(Taxonomy::Full), "Error 404 página no operativa");
        assert_eq!(Label::OtherHttpError(418).phrase(Taxonomy::Full), "Otro error HTTP: 418");
        assert_eq!(
            Label::LikelyOperationalNoResponse.phrase(Taxonomy::Full),
            "Sin respuesta; probable operatividad"
        );
    }

    #[test]
    fn binary_collapses_everything_but_operational() {
        assert_eq!(Label::Operational.phrase(Taxonomy::Binary), "Enlace operativo y funcional");
        for label in [
            Label::RedirectsToHome,
            Label::NotFound,
            Label::OtherHttpError(302),
            Label::LikelyOperationalNoResponse,
            Label::UnknownError,
        ] {
            assert_eq!(label.phrase(Taxonomy::Binary), "Enlace no operativo");
        }
    }

    #[test]
    fn only_operational_is_compliant() {
        assert!(Label::Operational.is_compliant());
        assert!(!Label::LikelyOperationalNoResponse.is_compliant());
        assert!(!Label::OtherHttpError(204).is_compliant());
    }

    #[test]
    fn dictionary_covers_every_phrase_family() {
        assert_eq!(DICTIONARY.len(), 10);
        assert!(DICTIONARY.iter().any(|e| e.phrase == Label::Forbidden.phrase(Taxonomy::Full)));
    }
}
