use crate::api::catalog::CatalogRecord;
use crate::db::models::Testimonial;
use crate::error::AppError;

impl CatalogRecord for Testimonial {
    const KIND: &'static str = "Testimonial";
    const REQUIRED: &'static [&'static str] = &["name", "message"];
    const LABEL_FIELD: &'static str = "name";

    fn validate(&self) -> Result<(), AppError> {
        match self.rating {
            Some(rating) if (1..=5).contains(&rating) => Ok(()),
            Some(rating) => Err(AppError::BadRequest(format!(
                "rating must be between 1 and 5, got {}",
                rating
            ))),
            None => Err(AppError::BadRequest("rating is required".into())),
        }
    }
}
