//! Local heuristic analysis: the tier that is always available.
//!
//! Pure function of the text: no I/O, no clock, no randomness. The same input
//! always yields the same candidate.
//!
//! Algorithm:
//! 1. industry = first keyword family with a hit (ordered), else "General"
//! 2. years = first "<N> years|años" match, else 3
//! 3. seniority: ≥5 → Senior, ≤2 → Junior, otherwise Semi-Senior
//! 4. skills = vocabulary terms found as substrings of the lower-cased text
//! 5. red flag when the text is shorter than `MIN_DETAILED_CHARS`
//! 6. score = 3 + 0.4·min(years,10) + 0.3·min(skills,10), clamped to [1,10]

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::intake::NormalizedText;

pub const DEFAULT_YEARS: u32 = 3;
/// Texts shorter than this (in characters) get a red flag.
pub const MIN_DETAILED_CHARS: usize = 100;
const MAX_PLAUSIBLE_YEARS: u32 = 50;

const SENIOR_MIN_YEARS: u32 = 5;
const JUNIOR_MAX_YEARS: u32 = 2;

/// Keyword families in priority order. The first family with any hit wins.
const INDUSTRY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "IT",
        &[
            "software", "developer", "desarrollador", "programador", "programación",
            "frontend", "backend", "full stack", "fullstack", "devops", "react", "node",
            "javascript", "typescript", "python", "java", "docker", "kubernetes", "cloud",
        ],
    ),
    (
        "Finanzas",
        &[
            "finanzas", "finance", "contabilidad", "contador", "contadora", "accounting",
            "auditoría", "auditor", "banca", "banking", "tesorería", "impuestos",
        ],
    ),
    (
        "Salud",
        &[
            "enfermería", "enfermera", "enfermero", "médico", "medico", "hospital",
            "clínica", "salud", "health", "nurse", "farmacia",
        ],
    ),
    (
        "Marketing",
        &[
            "marketing", "seo", "redes sociales", "social media", "branding", "publicidad",
            "community manager",
        ],
    ),
    (
        "Educación",
        &["docente", "profesor", "profesora", "teacher", "enseñanza", "educación", "education"],
    ),
    (
        "Ventas",
        &["ventas", "sales", "vendedor", "vendedora", "comercial", "account manager", "retail"],
    ),
];

const DEFAULT_INDUSTRY: &str = "General";

/// Fixed skill vocabulary, lower-case. Terms that are common substrings of
/// ordinary Spanish or English words ("go", "git", "excel") are left out.
const SKILL_VOCABULARY: &[&str] = &[
    "javascript", "typescript", "react", "angular", "vue", "node", "python", "java",
    "c#", ".net", "php", "django", "flask", "spring", "html", "css", "sql", "postgresql",
    "mysql", "mongodb", "graphql", "docker", "kubernetes", "terraform", "jenkins", "aws",
    "azure", "gcp", "linux", "github", "gitlab", "scrum", "agile", "jira", "figma",
    "photoshop", "power bi", "tableau", "sap", "salesforce", "seo", "google analytics",
];

/// Intermediate result of the local tier, before shaping.
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicReport {
    pub industry: String,
    pub role_seniority: String,
    pub top_roles: Vec<String>,
    pub skills: Vec<String>,
    pub score: f64,
    pub red_flags: Vec<String>,
    pub summary: String,
    pub next_steps: Vec<String>,
}

impl HeuristicReport {
    /// The candidate object handed to the shaper.
    pub fn into_candidate(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn analyze_locally(text: &NormalizedText) -> HeuristicReport {
    let lower = text.as_str().to_lowercase();

    let industry = detect_industry(&lower);
    let detected_years = extract_years(&lower);
    let years = detected_years.unwrap_or(DEFAULT_YEARS);
    let seniority = seniority_for(years);
    let skills = detect_skills(&lower);
    let too_short = text.char_len() < MIN_DETAILED_CHARS;

    let mut red_flags = Vec::new();
    if too_short {
        red_flags.push(
            "El CV es demasiado breve; faltan detalles sobre experiencia y logros.".to_string(),
        );
    }

    let summary = format!(
        "Perfil {seniority} del sector {industry} con aproximadamente {years} años de \
         experiencia y {} habilidades clave detectadas.",
        skills.len()
    );

    HeuristicReport {
        top_roles: roles_for(industry, seniority),
        next_steps: next_steps_for(seniority, skills.len(), too_short, detected_years.is_some()),
        score: score_for(years, skills.len()),
        industry: industry.to_string(),
        role_seniority: seniority.to_string(),
        skills,
        red_flags,
        summary,
    }
}

fn detect_industry(lower: &str) -> &'static str {
    INDUSTRY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(industry, _)| *industry)
        .unwrap_or(DEFAULT_INDUSTRY)
}

fn years_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})\s*\+?\s*(?:years?|yrs?|años?|anos?)\b")
            .expect("years pattern is a valid regex")
    })
}

/// First "<N> years" / "<N> años" figure in the text.
fn extract_years(lower: &str) -> Option<u32> {
    years_pattern()
        .captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|y| y.min(MAX_PLAUSIBLE_YEARS))
}

fn seniority_for(years: u32) -> &'static str {
    if years >= SENIOR_MIN_YEARS {
        "Senior"
    } else if years <= JUNIOR_MAX_YEARS {
        "Junior"
    } else {
        "Semi-Senior"
    }
}

fn detect_skills(lower: &str) -> Vec<String> {
    SKILL_VOCABULARY
        .iter()
        .filter(|skill| lower.contains(*skill))
        .map(|skill| skill.to_string())
        .collect()
}

fn score_for(years: u32, skill_count: usize) -> f64 {
    let years = years.min(10) as f64;
    let skills = skill_count.min(10) as f64;
    let raw = 3.0 + 0.4 * years + 0.3 * skills;
    (raw.clamp(1.0, 10.0) * 10.0).round() / 10.0
}

fn roles_for(industry: &str, seniority: &str) -> Vec<String> {
    let base: &[&str] = match industry {
        "IT" => &[
            "Desarrollador de Software",
            "Ingeniero Backend",
            "Ingeniero Frontend",
            "Ingeniero DevOps",
        ],
        "Finanzas" => &["Analista Financiero", "Contador", "Auditor"],
        "Salud" => &[
            "Profesional de Enfermería",
            "Coordinador de Salud",
            "Asistente Médico",
        ],
        "Marketing" => &[
            "Especialista en Marketing Digital",
            "Community Manager",
            "Analista SEO",
        ],
        "Educación" => &["Docente", "Coordinador Académico", "Diseñador Instruccional"],
        "Ventas" => &["Ejecutivo de Ventas", "Account Manager", "Representante Comercial"],
        _ => &["Asistente Administrativo", "Analista", "Coordinador de Proyectos"],
    };
    base.iter().map(|role| format!("{role} {seniority}")).collect()
}

fn next_steps_for(
    seniority: &str,
    skill_count: usize,
    too_short: bool,
    years_detected: bool,
) -> Vec<String> {
    let mut steps =
        vec!["Cuantifica tus logros con métricas concretas (%, tiempos, ingresos).".to_string()];
    if too_short {
        steps.push(
            "Amplía la descripción de tu experiencia, proyectos y responsabilidades.".to_string(),
        );
    }
    if skill_count < 5 {
        steps.push("Agrega una sección de habilidades con las herramientas que dominas.".to_string());
    }
    if !years_detected {
        steps.push("Indica claramente los años de experiencia en cada puesto.".to_string());
    }
    match seniority {
        "Senior" => {
            steps.push("Destaca experiencias de liderazgo y mentoría de equipos.".to_string())
        }
        "Junior" => steps.push(
            "Incluye proyectos personales, prácticas o voluntariados relevantes.".to_string(),
        ),
        _ => {}
    }
    steps.push("Adapta el resumen profesional a cada oferta a la que postules.".to_string());
    steps
}
