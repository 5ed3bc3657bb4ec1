pub mod services;

#[cfg(test)]
mod integration_tests;
