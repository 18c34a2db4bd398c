
#[cfg(test)]
mod ws_tests;
