mod portal;

pub use portal::{PortalClient, QuestionsFetch};
