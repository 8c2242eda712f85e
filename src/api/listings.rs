//! Packages, resorts and trips: plain catalog collections served by the
//! generic handlers in [`crate::api::catalog`].

use crate::api::catalog::{CatalogRecord, ListParams};
use crate::db::models::{Package, Resort, Trip};
use crate::db::repository::Filter;
use crate::error::AppError;

fn featured_filter(params: &ListParams) -> Filter {
    match params.featured {
        Some(featured) => Filter::new().eq("featured", featured),
        None => Filter::new(),
    }
}

fn check_non_negative(field: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(n) if n < 0.0 => Err(AppError::BadRequest(format!(
            "{} cannot be negative",
            field
        ))),
        _ => Ok(()),
    }
}

impl CatalogRecord for Package {
    const KIND: &'static str = "Package";
    const REQUIRED: &'static [&'static str] = &["title"];
    const LABEL_FIELD: &'static str = "title";

    fn list_filter(params: &ListParams) -> Filter {
        featured_filter(params)
    }

    fn finalize(&mut self) {
        self.itinerary.sort_by_key(|stop| stop.day.unwrap_or(i64::MAX));
    }

    fn validate(&self) -> Result<(), AppError> {
        check_non_negative("price", self.price)
    }
}

impl CatalogRecord for Resort {
    const KIND: &'static str = "Resort";
    const REQUIRED: &'static [&'static str] = &["name"];
    const LABEL_FIELD: &'static str = "name";

    fn list_filter(params: &ListParams) -> Filter {
        featured_filter(params)
    }

    fn validate(&self) -> Result<(), AppError> {
        check_non_negative("pricePerNight", self.price_per_night)?;
        match self.rating {
            Some(r) if !(0.0..=5.0).contains(&r) => Err(AppError::BadRequest(
                "rating must be between 0 and 5".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl CatalogRecord for Trip {
    const KIND: &'static str = "Trip";
    const REQUIRED: &'static [&'static str] = &["title"];
    const LABEL_FIELD: &'static str = "title";

    fn list_filter(params: &ListParams) -> Filter {
        match params.activity.as_deref().map(str::trim) {
            Some(activity) if !activity.is_empty() => {
                Filter::new().eq("activity", activity.to_string())
            }
            _ => Filter::new(),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        check_non_negative("price", self.price)?;
        match self.group_size {
            Some(size) if size < 1 => Err(AppError::BadRequest(
                "groupSize must be at least 1".into(),
            )),
            _ => Ok(()),
        }
    }
}
