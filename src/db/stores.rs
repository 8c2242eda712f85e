use std::sync::Arc;

use crate::auth::models::User;
use crate::db::memory::MemoryRepository;
use crate::db::models::{
    CascadeFailure, Destination, DestinationTrip, Package, Resort, Story, Testimonial, Trip,
};
use crate::db::mongo::MongoRepository;
use crate::db::repository::{Record, Repository};
use crate::error::AppError;

/// Every repository the service uses, one per collection.
#[derive(Clone)]
pub struct Stores {
    pub destinations: Arc<dyn Repository<Destination>>,
    pub destination_trips: Arc<dyn Repository<DestinationTrip>>,
    pub packages: Arc<dyn Repository<Package>>,
    pub resorts: Arc<dyn Repository<Resort>>,
    pub trips: Arc<dyn Repository<Trip>>,
    pub stories: Arc<dyn Repository<Story>>,
    pub testimonials: Arc<dyn Repository<Testimonial>>,
    pub users: Arc<dyn Repository<User>>,
    pub cascade_failures: Arc<dyn Repository<CascadeFailure>>,
}

impl Stores {
    /// Process-local stores; contents are lost on exit.
    pub fn memory() -> Self {
        Self {
            destinations: Arc::new(MemoryRepository::new()),
            destination_trips: Arc::new(MemoryRepository::new()),
            packages: Arc::new(MemoryRepository::new()),
            resorts: Arc::new(MemoryRepository::new()),
            trips: Arc::new(MemoryRepository::new()),
            stories: Arc::new(MemoryRepository::new()),
            testimonials: Arc::new(MemoryRepository::new()),
            users: Arc::new(MemoryRepository::new()),
            cascade_failures: Arc::new(MemoryRepository::new()),
        }
    }

    /// MongoDB-backed stores. Creates the unique indexes before returning.
    pub async fn mongo(db: &mongodb::Database) -> Result<Self, AppError> {
        Ok(Self {
            destinations: mongo_store(db).await?,
            destination_trips: mongo_store(db).await?,
            packages: mongo_store(db).await?,
            resorts: mongo_store(db).await?,
            trips: mongo_store(db).await?,
            stories: mongo_store(db).await?,
            testimonials: mongo_store(db).await?,
            users: mongo_store(db).await?,
            cascade_failures: mongo_store(db).await?,
        })
    }
}

async fn mongo_store<T: Record>(
    db: &mongodb::Database,
) -> Result<Arc<dyn Repository<T>>, AppError> {
    let repo = MongoRepository::<T>::new(db);
    repo.ensure_indexes().await?;
    Ok(Arc::new(repo))
}

/// Access to the repository holding records of type `T`.
pub trait HasStore<T: Record> {
    fn store(&self) -> &dyn Repository<T>;
}

macro_rules! has_store {
    ($record:ty, $field:ident) => {
        impl HasStore<$record> for Stores {
            fn store(&self) -> &dyn Repository<$record> {
                self.$field.as_ref()
            }
        }
    };
}

has_store!(Destination, destinations);
has_store!(DestinationTrip, destination_trips);
has_store!(Package, packages);
has_store!(Resort, resorts);
has_store!(Trip, trips);
has_store!(Story, stories);
has_store!(Testimonial, testimonials);
has_store!(User, users);
has_store!(CascadeFailure, cascade_failures);
