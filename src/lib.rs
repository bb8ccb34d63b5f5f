pub mod external_services;
pub mod simulation;

#[cfg(any(test, feature = "test_util"))]
pub mod test_utils;
