pub mod ai;
pub mod context;
pub mod journal;
pub mod priorities;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

/// `?date=YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// `?date=YYYY-MM-DD`, defaulting to today
#[derive(Debug, Default, Deserialize)]
pub struct OptionalDateQuery {
    pub date: Option<NaiveDate>,
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
