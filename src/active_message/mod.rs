pub mod selector;

#[cfg(feature = "lamellar")]
pub mod lamellar_am;
