//! BlogRating entity - one 1..=5 score per user and blog
//!
//! Table: school_blog_rating

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lowest accepted score
pub const MIN_RATING: i32 = 1;
/// Highest accepted score
pub const MAX_RATING: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_blog_rating")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub blog_id: i32,

    pub user_id: i32,

    pub rating: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn is_valid_rating(rating: i32) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// Rating summary for a blog
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: usize,
}

impl RatingSummary {
    pub fn from_scores<I: IntoIterator<Item = i32>>(scores: I) -> Self {
        let (sum, count) = scores
            .into_iter()
            .fold((0i64, 0usize), |(sum, count), s| (sum + s as i64, count + 1));
        if count == 0 {
            return Self::default();
        }
        Self {
            average: sum as f64 / count as f64,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(!is_valid_rating(0));
        assert!(is_valid_rating(1));
        assert!(is_valid_rating(5));
        assert!(!is_valid_rating(6));
    }

    #[test]
    fn summary_of_scores() {
        assert_eq!(RatingSummary::from_scores(Vec::new()), RatingSummary::default());
        let summary = RatingSummary::from_scores(vec![5, 4, 3]);
        assert_eq!(summary.count, 3);
        assert!((summary.average - 4.0).abs() < f64::EPSILON);
    }
}
