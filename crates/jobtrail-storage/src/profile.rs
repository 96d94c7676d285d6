//! Profile tables used to tailor resumes and cover letters.

use std::collections::BTreeMap;

use jobtrail_core::{
    Certification, Education, Honor, JobHistory, ProfileKey, Skill, SkillCategory, Stored,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use crate::{JobStore, StoreError};

// Entries without an explicit sort order go last, then by insertion.
const ORDER: &str = "ORDER BY sort_order IS NULL, sort_order, id";

fn parse_column<T: std::str::FromStr>(
    column: &'static str,
    value: String,
) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::corrupt(column, value.clone()))
}

fn skill_from_row(row: &SqliteRow) -> Result<Stored<Skill>, StoreError> {
    let proficiency: Option<String> = row.try_get("proficiency")?;
    Ok(Stored {
        id: row.try_get("id")?,
        value: Skill {
            name: row.try_get("name")?,
            category: parse_column("category", row.try_get("category")?)?,
            proficiency: proficiency
                .map(|p| parse_column("proficiency", p))
                .transpose()?,
            sort_order: row.try_get("sort_order")?,
        },
    })
}

impl JobStore {
    pub async fn set_meta(&self, key: ProfileKey, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO profile_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_meta(&self, key: ProfileKey) -> Result<Option<String>, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT value FROM profile_meta WHERE key = ?")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// All recognised profile fields. Rows with unknown keys are skipped.
    pub async fn all_meta(&self) -> Result<BTreeMap<ProfileKey, String>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM profile_meta")
            .fetch_all(&self.pool)
            .await?;
        let mut meta = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            match key.parse::<ProfileKey>() {
                Ok(parsed) => {
                    meta.insert(parsed, row.try_get("value")?);
                }
                Err(_) => warn!(key = %key, "ignoring unknown profile key"),
            }
        }
        Ok(meta)
    }

    pub async fn add_job_history(&self, entry: &JobHistory) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO job_history \
                 (company, title, start_date, end_date, location, description, sort_order) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&entry.company)
        .bind(&entry.title)
        .bind(&entry.start_date)
        .bind(&entry.end_date)
        .bind(&entry.location)
        .bind(&entry.description)
        .bind(entry.sort_order)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn job_history(&self) -> Result<Vec<Stored<JobHistory>>, StoreError> {
        let rows = sqlx::query(&format!("SELECT * FROM job_history {ORDER}"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Stored {
                    id: row.try_get("id")?,
                    value: JobHistory {
                        company: row.try_get("company")?,
                        title: row.try_get("title")?,
                        start_date: row.try_get("start_date")?,
                        end_date: row.try_get("end_date")?,
                        location: row.try_get("location")?,
                        description: row.try_get("description")?,
                        sort_order: row.try_get("sort_order")?,
                    },
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    pub async fn add_education(&self, entry: &Education) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO education \
                 (institution, degree, field, start_date, end_date, description, sort_order) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&entry.institution)
        .bind(&entry.degree)
        .bind(&entry.field)
        .bind(&entry.start_date)
        .bind(&entry.end_date)
        .bind(&entry.description)
        .bind(entry.sort_order)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn education(&self) -> Result<Vec<Stored<Education>>, StoreError> {
        let rows = sqlx::query(&format!("SELECT * FROM education {ORDER}"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Stored {
                    id: row.try_get("id")?,
                    value: Education {
                        institution: row.try_get("institution")?,
                        degree: row.try_get("degree")?,
                        field: row.try_get("field")?,
                        start_date: row.try_get("start_date")?,
                        end_date: row.try_get("end_date")?,
                        description: row.try_get("description")?,
                        sort_order: row.try_get("sort_order")?,
                    },
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    pub async fn add_certification(&self, entry: &Certification) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO certifications (name, issuer, date_earned, sort_order) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&entry.name)
        .bind(&entry.issuer)
        .bind(&entry.date_earned)
        .bind(entry.sort_order)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn certifications(&self) -> Result<Vec<Stored<Certification>>, StoreError> {
        let rows = sqlx::query(&format!("SELECT * FROM certifications {ORDER}"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Stored {
                    id: row.try_get("id")?,
                    value: Certification {
                        name: row.try_get("name")?,
                        issuer: row.try_get("issuer")?,
                        date_earned: row.try_get("date_earned")?,
                        sort_order: row.try_get("sort_order")?,
                    },
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    pub async fn add_honor(&self, entry: &Honor) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO honors (name, issuer, description, sort_order) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&entry.name)
        .bind(&entry.issuer)
        .bind(&entry.description)
        .bind(entry.sort_order)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn honors(&self) -> Result<Vec<Stored<Honor>>, StoreError> {
        let rows = sqlx::query(&format!("SELECT * FROM honors {ORDER}"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Stored {
                    id: row.try_get("id")?,
                    value: Honor {
                        name: row.try_get("name")?,
                        issuer: row.try_get("issuer")?,
                        description: row.try_get("description")?,
                        sort_order: row.try_get("sort_order")?,
                    },
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    /// Inserts a skill or replaces the one with the same name.
    pub async fn upsert_skill(&self, skill: &Skill) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO skills (name, category, proficiency, sort_order) VALUES (?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET category = excluded.category, \
                 proficiency = excluded.proficiency, sort_order = excluded.sort_order \
             RETURNING id",
        )
        .bind(&skill.name)
        .bind(skill.category.as_str())
        .bind(skill.proficiency.map(|p| p.as_str()))
        .bind(skill.sort_order)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn skills(
        &self,
        category: Option<SkillCategory>,
    ) -> Result<Vec<Stored<Skill>>, StoreError> {
        let rows = match category {
            Some(category) => {
                sqlx::query(&format!("SELECT * FROM skills WHERE category = ? {ORDER}"))
                    .bind(category.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("SELECT * FROM skills {ORDER}"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(skill_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use jobtrail_core::Proficiency;

    use super::*;
    use crate::store::testing::temp_store;

    #[tokio::test]
    async fn meta_is_keyed_by_profile_key() {
        let (_dir, store) = temp_store().await;
        store.set_meta(ProfileKey::Name, "Ada").await.unwrap();
        store.set_meta(ProfileKey::Name, "Ada L.").await.unwrap();
        store.set_meta(ProfileKey::Email, "ada@example.com").await.unwrap();

        assert_eq!(
            store.get_meta(ProfileKey::Name).await.unwrap().as_deref(),
            Some("Ada L.")
        );
        assert_eq!(store.get_meta(ProfileKey::Github).await.unwrap(), None);
        assert_eq!(store.all_meta().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_is_listed_by_sort_order() {
        let (_dir, store) = temp_store().await;
        for (company, order) in [("Later", Some(2)), ("Unsorted", None), ("First", Some(1))] {
            store
                .add_job_history(&JobHistory {
                    company: company.into(),
                    title: "Technical Writer".into(),
                    sort_order: order,
                    ..JobHistory::default()
                })
                .await
                .unwrap();
        }
        let companies: Vec<_> = store
            .job_history()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.value.company)
            .collect();
        assert_eq!(companies, ["First", "Later", "Unsorted"]);
    }

    #[tokio::test]
    async fn skills_upsert_by_name_and_filter_by_category() {
        let (_dir, store) = temp_store().await;
        let mut skill = Skill {
            name: "OpenAPI".into(),
            category: SkillCategory::ApiDevTools,
            proficiency: Some(Proficiency::Advanced),
            sort_order: None,
        };
        let id = store.upsert_skill(&skill).await.unwrap();
        skill.proficiency = Some(Proficiency::Expert);
        assert_eq!(store.upsert_skill(&skill).await.unwrap(), id);
        store
            .upsert_skill(&Skill {
                name: "Python".into(),
                category: SkillCategory::Languages,
                proficiency: None,
                sort_order: None,
            })
            .await
            .unwrap();

        let api = store.skills(Some(SkillCategory::ApiDevTools)).await.unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].value.proficiency, Some(Proficiency::Expert));
        assert_eq!(store.skills(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn certifications_honors_and_education_are_stored() {
        let (_dir, store) = temp_store().await;
        store
            .add_certification(&Certification {
                name: "CPTC".into(),
                ..Certification::default()
            })
            .await
            .unwrap();
        store
            .add_honor(&Honor {
                name: "Dean's List".into(),
                ..Honor::default()
            })
            .await
            .unwrap();
        store
            .add_education(&Education {
                institution: "State University".into(),
                degree: Some("BA".into()),
                ..Education::default()
            })
            .await
            .unwrap();

        assert_eq!(store.certifications().await.unwrap()[0].value.name, "CPTC");
        assert_eq!(store.honors().await.unwrap()[0].value.name, "Dean's List");
        assert_eq!(
            store.education().await.unwrap()[0].value.degree.as_deref(),
            Some("BA")
        );
    }
}
