use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub created: Option<u64>,
    pub owned_by: Option<String>,
}

/// Body of `GET {base_url}/models`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

pub fn sort_models(models: &mut [ModelInfo]) {
    // Newest first, then by ID for a stable listing.
    models.sort_by(|a, b| match (a.created, b.created) {
        (Some(a_created), Some(b_created)) => b_created.cmp(&a_created).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_sort_newest_first_then_by_id() {
        let mut response: ModelsResponse = serde_json::from_str(
            r#"{"data":[
                {"id":"b"},
                {"id":"old","created":1},
                {"id":"a"},
                {"id":"new","created":9}
            ]}"#,
        )
        .unwrap();
        sort_models(&mut response.data);
        let ids: Vec<&str> = response.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "a", "b"]);
    }
}
