pub mod client;
pub mod key;
pub mod mutation;
pub mod state;
pub mod subscription;

pub use client::QueryClient;
pub use key::QueryKey;
pub use mutation::Mutation;
pub use state::{
    FetchFuture, Fetcher, MutationState, MutationStatus, QueryConfig, QueryOptions, QueryState,
    QueryStatus,
};
pub use subscription::Subscription;
