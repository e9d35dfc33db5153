pub mod rest;
pub mod state;

pub use rest::{
    active_commitments_handler, create_commitment_handler, delete_commitment_handler,
    list_commitments_handler, recap_handler, verify_commitment_handler,
};
pub use state::AppState;
