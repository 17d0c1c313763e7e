pub mod abbf;
pub mod health;
pub mod policy;
pub mod sessions;

#[cfg(test)]
pub(crate) mod test_support;
