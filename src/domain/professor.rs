//! Professor rating nodes from the ratings GraphQL search.

use serde::{Deserialize, Serialize};

use super::de::{lenient_f64, lenient_i64, string_or_number};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawProfessorNode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub legacy_id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub department: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub avg_rating: Option<f64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub num_ratings: Option<i64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub avg_difficulty: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub would_take_again_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfessorRecord {
    pub id: Option<String>,
    pub legacy_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub avg_rating: Option<f64>,
    pub num_ratings: Option<i64>,
    pub avg_difficulty: Option<f64>,
    /// As reported; the service uses -1 for "not enough ratings"
    pub would_take_again_percent: Option<f64>,
}

pub fn normalize_professor(node: &RawProfessorNode) -> ProfessorRecord {
    ProfessorRecord {
        id: node.id.clone(),
        legacy_id: node.legacy_id.clone(),
        first_name: node.first_name.as_deref().map(str::trim).map(String::from),
        last_name: node.last_name.as_deref().map(str::trim).map(String::from),
        department: node.department.clone(),
        avg_rating: node.avg_rating,
        num_ratings: node.num_ratings,
        avg_difficulty: node.avg_difficulty,
        would_take_again_percent: node.would_take_again_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_to_record() {
        let node: RawProfessorNode = serde_json::from_value(json!({
            "__typename": "Teacher",
            "id": "VGVhY2hlci0xMjM=",
            "legacyId": 123,
            "firstName": " Barbara ",
            "lastName": "Liskov",
            "department": "Computer Science",
            "avgRating": 4.6,
            "numRatings": 87,
            "avgDifficulty": 3.1,
            "wouldTakeAgainPercent": 92.5,
            "school": { "name": "University", "id": "U2Nob29s" }
        }))
        .unwrap();

        let record = normalize_professor(&node);
        assert_eq!(record.legacy_id.as_deref(), Some("123"));
        assert_eq!(record.first_name.as_deref(), Some("Barbara"));
        assert_eq!(record.num_ratings, Some(87));
        assert_eq!(record.would_take_again_percent, Some(92.5));
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let record = normalize_professor(&RawProfessorNode::default());
        assert_eq!(record, ProfessorRecord::default());
    }
}
