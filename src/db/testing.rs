//! `mockall` doubles of [`Repository`] for unit tests that need to script
//! store failures or assert that a store is never touched.

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;

use crate::db::models::{DestinationTrip, Package, Resort, Trip};
use crate::db::repository::{Filter, Repository};
use crate::error::AppError;

macro_rules! repository_mock {
    ($name:ident, $record:ident) => {
        mock! {
            pub $name {}

            #[async_trait]
            impl Repository<$record> for $name {
                async fn insert(&self, record: &$record) -> Result<(), AppError>;
                async fn find(&self, key: &str) -> Result<Option<$record>, AppError>;
                async fn exists(&self, key: &str) -> Result<bool, AppError>;
                async fn list(&self, filter: &Filter) -> Result<Vec<$record>, AppError>;
                async fn replace(&self, key: &str, record: &$record) -> Result<bool, AppError>;
                async fn delete(&self, key: &str) -> Result<bool, AppError>;
                async fn search(&self, text: &str, limit: usize) -> Result<Vec<$record>, AppError>;
                async fn delete_where(&self, filter: &Filter) -> Result<u64, AppError>;
                async fn set_where(
                    &self,
                    filter: &Filter,
                    field: &'static str,
                    value: Value,
                ) -> Result<u64, AppError>;
            }
        }
    };
}

repository_mock!(DestinationTripStore, DestinationTrip);
repository_mock!(PackageStore, Package);
repository_mock!(ResortStore, Resort);
repository_mock!(TripStore, Trip);
