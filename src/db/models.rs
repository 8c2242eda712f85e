use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::db::repository::{Direction, Record};
use crate::normalize::{
    exclusions_list, inclusions_list, lenient_f64, lenient_i64, lenient_i64_or_zero, lenient_vec,
    StringList,
};

/// UTC instant serialized as RFC 3339 with fixed millisecond precision, so
/// stored values sort chronologically as strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

const NEWEST_FIRST: &[(&str, Direction)] = &[("createdAt", Direction::Desc)];

/// A place travellers can browse trips for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Destination {
    pub slug: String,
    pub name: String,
    pub country: String,
    pub description: String,
    pub image: String,
    /// Shown in the "popular destinations" strip.
    pub popular: bool,
    /// Display order; lower numbers appear first.
    #[serde(deserialize_with = "lenient_i64_or_zero")]
    pub order: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for Destination {
    const COLLECTION: &'static str = "destinations";
    const KEY_FIELD: &'static str = "slug";
    const SEARCH_FIELDS: &'static [&'static str] = &["name", "country", "description", "slug"];
    const SORT: &'static [(&'static str, Direction)] =
        &[("order", Direction::Asc), ("name", Direction::Asc)];

    fn key(&self) -> &str {
        &self.slug
    }
}

/// A trip listed under a destination.
///
/// `destination_slug` is a soft reference: nothing in the store enforces it,
/// the destination handlers keep it in sync on rename and delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DestinationTrip {
    pub slug: String,
    pub destination_slug: String,
    pub title: String,
    pub description: String,
    pub duration: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    pub images: StringList,
    #[serde(deserialize_with = "inclusions_list")]
    pub inclusions: StringList,
    #[serde(deserialize_with = "exclusions_list")]
    pub exclusions: StringList,
    pub highlights: StringList,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for DestinationTrip {
    const COLLECTION: &'static str = "destination_trips";
    const KEY_FIELD: &'static str = "slug";
    const SEARCH_FIELDS: &'static [&'static str] = &["title", "description", "slug"];
    const SORT: &'static [(&'static str, Direction)] = NEWEST_FIRST;

    fn key(&self) -> &str {
        &self.slug
    }
}

/// One day of a package itinerary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItineraryStop {
    #[serde(deserialize_with = "lenient_i64")]
    pub day: Option<i64>,
    pub title: String,
    pub description: String,
}

/// A bookable holiday package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Package {
    pub slug: String,
    pub title: String,
    pub location: String,
    pub country: String,
    pub description: String,
    pub duration: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    pub images: StringList,
    #[serde(deserialize_with = "lenient_vec")]
    pub itinerary: Vec<ItineraryStop>,
    #[serde(deserialize_with = "inclusions_list")]
    pub inclusions: StringList,
    #[serde(deserialize_with = "exclusions_list")]
    pub exclusions: StringList,
    pub highlights: StringList,
    pub tags: StringList,
    pub featured: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for Package {
    const COLLECTION: &'static str = "packages";
    const KEY_FIELD: &'static str = "slug";
    const SEARCH_FIELDS: &'static [&'static str] =
        &["title", "location", "country", "description", "tags", "slug"];
    const SORT: &'static [(&'static str, Direction)] = NEWEST_FIRST;

    fn key(&self) -> &str {
        &self.slug
    }
}

/// A room category offered by a resort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomType {
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    pub image: String,
    pub amenities: StringList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resort {
    pub slug: String,
    pub name: String,
    pub location: String,
    pub country: String,
    pub description: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price_per_night: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub rating: Option<f64>,
    pub images: StringList,
    #[serde(deserialize_with = "lenient_vec")]
    pub room_types: Vec<RoomType>,
    pub amenities: StringList,
    pub activities: StringList,
    pub dining: StringList,
    pub tags: StringList,
    pub featured: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for Resort {
    const COLLECTION: &'static str = "resorts";
    const KEY_FIELD: &'static str = "slug";
    const SEARCH_FIELDS: &'static [&'static str] =
        &["name", "location", "country", "description", "tags", "slug"];
    const SORT: &'static [(&'static str, Direction)] = NEWEST_FIRST;

    fn key(&self) -> &str {
        &self.slug
    }
}

/// An activity-led trip (trekking, diving, safari...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Trip {
    pub slug: String,
    pub title: String,
    pub activity: String,
    pub location: String,
    pub country: String,
    pub description: String,
    pub difficulty: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub group_size: Option<i64>,
    pub duration: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    pub images: StringList,
    pub highlights: StringList,
    #[serde(deserialize_with = "inclusions_list")]
    pub inclusions: StringList,
    #[serde(deserialize_with = "exclusions_list")]
    pub exclusions: StringList,
    pub tags: StringList,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for Trip {
    const COLLECTION: &'static str = "trips";
    const KEY_FIELD: &'static str = "slug";
    const SEARCH_FIELDS: &'static [&'static str] =
        &["title", "location", "country", "description", "tags", "slug"];
    const SORT: &'static [(&'static str, Direction)] = NEWEST_FIRST;

    fn key(&self) -> &str {
        &self.slug
    }
}

/// Words per minute used for `Story::read_time`.
pub const READING_SPEED_WPM: usize = 200;

/// A user-submitted travel story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Story {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub cover_image: String,
    pub tags: StringList,
    /// Soft reference to `User::id`.
    pub author_id: String,
    pub author_name: String,
    /// Minutes, derived from `content`.
    pub read_time: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Story {
    /// Whole minutes to read `content`, rounded up, never less than one.
    pub fn compute_read_time(content: &str) -> u32 {
        let words = content.split_whitespace().count();
        words.div_ceil(READING_SPEED_WPM).max(1) as u32
    }
}

impl Record for Story {
    const COLLECTION: &'static str = "stories";
    const KEY_FIELD: &'static str = "slug";
    const SEARCH_FIELDS: &'static [&'static str] = &["title", "content", "tags", "slug"];
    const SORT: &'static [(&'static str, Direction)] = NEWEST_FIRST;

    fn key(&self) -> &str {
        &self.slug
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Testimonial {
    pub id: String,
    pub name: String,
    pub location: String,
    /// 1 to 5 stars.
    #[serde(deserialize_with = "lenient_i64")]
    pub rating: Option<i64>,
    pub message: String,
    pub avatar: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for Testimonial {
    const COLLECTION: &'static str = "testimonials";
    const KEY_FIELD: &'static str = "id";
    const SORT: &'static [(&'static str, Direction)] = NEWEST_FIRST;

    fn key(&self) -> &str {
        &self.id
    }
}

/// The follow-up write a cascade failed to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeAction {
    /// Delete children of a deleted parent.
    #[default]
    Delete,
    /// Re-point children from the parent's old slug to `new_slug`.
    Rename,
}

/// A cascade step that failed after its parent write succeeded, kept until an
/// admin retries it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CascadeFailure {
    pub id: String,
    pub parent_collection: String,
    pub parent_slug: String,
    pub child_collection: String,
    pub action: CascadeAction,
    pub new_slug: Option<String>,
    pub error: String,
    pub created_at: Timestamp,
}

impl Record for CascadeFailure {
    const COLLECTION: &'static str = "cascade_failures";
    const KEY_FIELD: &'static str = "id";
    const SORT: &'static [(&'static str, Direction)] = &[("createdAt", Direction::Asc)];

    fn key(&self) -> &str {
        &self.id
    }
}
