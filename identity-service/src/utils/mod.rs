pub mod natural_id;
pub mod password;
pub mod validation;

pub use natural_id::{NaturalId, NaturalIdError};
pub use password::{
    derive_initial_password, HashCost, Password, PasswordError, PasswordHashString,
    PasswordHasher, PasswordPolicy,
};
pub use validation::ValidatedJson;
