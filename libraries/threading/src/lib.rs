#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(feature = "std", test))]
extern crate std;

mod futures;

pub use futures::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on() {
        let fut = async { 42 };

        assert_eq!(block_on!(fut), 42);

        let fut = async {
            yield_now().await;
            yield_now().await;
            24
        };

        assert_eq!(block_on!(fut), 24);
    }
}
