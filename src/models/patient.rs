use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
  pub id: i64,
  pub name: String,
  pub age: i64,
  /// Free-text diagnosis, e.g. "ACL tear"
  pub injury: String,
  pub last_visit: Option<NaiveDate>,
  pub next_visit: Option<NaiveDate>,
}

impl Patient {
  pub fn new(id: i64, name: &str, age: i64, injury: &str) -> Self {
    Self {
      id,
      name: name.to_string(),
      age,
      injury: injury.to_string(),
      last_visit: None,
      next_visit: None,
    }
  }
}
