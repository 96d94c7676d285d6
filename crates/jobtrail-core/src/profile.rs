//! Profile entries used when tailoring applications.

use serde::{Deserialize, Serialize};

string_enum! {
    /// Recognised singleton profile fields.
    pub enum ProfileKey for "profile key" {
        Name => "name",
        Title => "title",
        Location => "location",
        Email => "email",
        Linkedin => "linkedin",
        Github => "github",
        Summary => "summary",
    }
}

string_enum! {
    pub enum SkillCategory for "skill category" {
        Writing => "writing",
        ApiDevTools => "api_dev_tools",
        AiMl => "ai_ml",
        ContentStrategy => "content_strategy",
        TaxonomyIa => "taxonomy_ia",
        Tools => "tools",
        Languages => "languages",
    }
}

string_enum! {
    pub enum Proficiency for "proficiency" {
        Expert => "expert",
        Advanced => "advanced",
        Intermediate => "intermediate",
        Familiar => "familiar",
    }
}

/// A persisted entry with its row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: i64,
    #[serde(flatten)]
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobHistory {
    pub company: String,
    pub title: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: Option<String>,
    pub field: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    pub issuer: Option<String>,
    pub date_earned: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Honor {
    pub name: String,
    pub issuer: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub category: SkillCategory,
    pub proficiency: Option<Proficiency>,
    pub sort_order: Option<i64>,
}
