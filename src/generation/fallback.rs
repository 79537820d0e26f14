//! Canned fallback content for when the upstream provider is down.
//!
//! Fallback artifacts are served free of charge; the spend gate never
//! debits for them. Only letters and chat replies have fallbacks, a
//! templated quiz would be worse than an honest error.

use super::service::{GeneratedArtifact, GenerationRequest, Language};

/// Produce a fallback artifact for a request, if one exists.
#[must_use]
pub fn fallback_for(request: &GenerationRequest) -> Option<GeneratedArtifact> {
    match request {
        GenerationRequest::ParentLetter {
            student_context,
            tone,
            language,
        } => Some(fallback_letter(student_context, tone, *language)),
        GenerationRequest::ChatReply { language, .. } => Some(fallback_chat_reply(*language)),
        GenerationRequest::Quiz { .. } => None,
    }
}

fn fallback_letter(student_context: &str, tone: &str, language: Language) -> GeneratedArtifact {
    let (title, content) = match language {
        Language::De => (
            "Elternbrief",
            format!(
                "Liebe Eltern,\n\n\
                 wir möchten Sie über den aktuellen Stand informieren: {student_context}\n\n\
                 Bei Fragen stehen wir Ihnen gerne zur Verfügung.\n\n\
                 Mit freundlichen Grüssen\n\
                 Ihr Lehrerteam"
            ),
        ),
        Language::Fr => (
            "Lettre aux parents",
            format!(
                "Chers parents,\n\n\
                 Nous souhaitons vous informer de la situation actuelle : {student_context}\n\n\
                 N'hésitez pas à nous contacter pour toute question.\n\n\
                 Cordialement,\n\
                 L'équipe enseignante"
            ),
        ),
        Language::It => (
            "Lettera ai genitori",
            format!(
                "Cari genitori,\n\n\
                 desideriamo informarvi sulla situazione attuale: {student_context}\n\n\
                 Non esitate a contattarci per qualsiasi domanda.\n\n\
                 Cordiali saluti,\n\
                 Il team docenti"
            ),
        ),
        Language::En => (
            "Letter to Parents",
            format!(
                "Dear Parents,\n\n\
                 We would like to update you on the following: {student_context}\n\n\
                 Please do not hesitate to contact us with any questions.\n\n\
                 Kind regards,\n\
                 The Teaching Team"
            ),
        ),
    };

    tracing::warn!(
        target: "lernwerk::generation",
        tone = %tone,
        language = %language,
        "Serving fallback parent letter"
    );

    GeneratedArtifact::new("parent_letter", title, content, language)
}

fn fallback_chat_reply(language: Language) -> GeneratedArtifact {
    let content = match language {
        Language::De => {
            "Der Assistent ist momentan nicht erreichbar. \
             Bitte versuchen Sie es in einigen Minuten erneut."
        }
        Language::Fr => {
            "L'assistant est momentanément indisponible. \
             Veuillez réessayer dans quelques minutes."
        }
        Language::It => {
            "L'assistente non è al momento disponibile. \
             Si prega di riprovare tra qualche minuto."
        }
        Language::En => {
            "The assistant is temporarily unavailable. \
             Please try again in a few minutes."
        }
    };

    GeneratedArtifact::new("chat_reply", "Chat reply", content, language)
}
