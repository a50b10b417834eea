#[cfg(test)]
mod common;

#[cfg(test)]
mod completion_test;

#[cfg(test)]
mod group_test;
