//! Entity lists handed over by the upstream event feed.

use std::path::Path;

use anyhow::{Context, Result};
use qcmp_core::EntityReference;
use tokio::fs;
use tracing::debug;

/// Reads a JSON array of entities. Feed field names (`short_name`,
/// `Long_Name`, `meeting_date`) are accepted; entries without an identifier
/// are dropped.
pub async fn load_entities(path: &Path) -> Result<Vec<EntityReference>> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let entities: Vec<EntityReference> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let total = entities.len();
    let entities = entities
        .into_iter()
        .filter(|e| !e.display_id.trim().is_empty())
        .map(|mut e| {
            e.display_id = e.display_id.trim().to_string();
            e
        })
        .collect::<Vec<_>>();
    debug!(path = %path.display(), total, kept = entities.len(), "entities loaded");
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn reads_feed_shaped_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            r#"[
                {"scrip_Code": "500001", "short_name": " ACME ", "Long_Name": "Acme Industries Ltd", "meeting_date": "14 Aug 2024", "URL": "x"},
                {"display_id": "GLOBEX", "long_label": "Globex Corp", "as_of_date": "2024-08-14"},
                {"short_name": "   "}
            ]"#,
        )
        .unwrap();

        let entities = load_entities(&path).await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].display_id, "ACME");
        assert_eq!(entities[0].long_label, "Acme Industries Ltd");
        assert_eq!(entities[0].as_of_date, NaiveDate::from_ymd_opt(2024, 8, 14));
        assert_eq!(entities[1].as_of_date, entities[0].as_of_date);
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let err = load_entities(Path::new("/nonexistent/events.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/events.json"));
    }
}
