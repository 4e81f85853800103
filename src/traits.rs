use crate::backend::Backend;
use crate::error::AllocError;
use crate::{Arena, Array};

/// Implements collect to `Arena` allocated arrays.
pub trait ArenaIterator: Iterator {
    fn collect_array<'a, B: Backend>(self, arena: &'a Arena<B>) -> Result<Array<'a, Self::Item, B>, AllocError>
        where Self::Item: Copy;

    fn collect_result_array<'a, B, I, E>(self, arena: &'a Arena<B>) -> Result<Array<'a, I, B>, E>
        where
            B: Backend,
            I: Copy,
            Self: Iterator<Item=Result<I, E>>,
            E: From<AllocError>;
}

impl<Q: Iterator> ArenaIterator for Q {
    fn collect_array<'a, B: Backend>(self, arena: &'a Arena<B>) -> Result<Array<'a, Self::Item, B>, AllocError>
        where Self::Item: Copy
    {
        let (lower, _) = self.size_hint();
        let mut array = Array::with_capacity(arena, lower)?;
        for item in self {
            array.push(item)?;
        }
        Ok(array)
    }

    fn collect_result_array<'a, B, I, E>(self, arena: &'a Arena<B>) -> Result<Array<'a, I, B>, E>
        where
            B: Backend,
            I: Copy,
            Self: Iterator<Item=Result<I, E>>,
            E: From<AllocError>
    {
        let (lower, _) = self.size_hint();
        let mut array = Array::with_capacity(arena, lower)?;
        for item in self {
            array.push(item?)?;
        }
        Ok(array)
    }
}

#[cfg(test)]
mod traits_tests {
    use crate::{AllocError, Arena, ArenaIterator};

    #[test]
    fn collect_result_array_stops_at_first_error() {
        #[derive(Debug)]
        enum ParseError {
            Alloc,
            Bad(String),
        }

        impl From<AllocError> for ParseError {
            fn from(_: AllocError) -> Self {
                ParseError::Alloc
            }
        }

        let arena = Arena::new();
        let parse = |s: &str| s.parse::<u16>().map_err(|_| ParseError::Bad(s.to_string()));

        let numbers = "1 2 3".split(' ').map(parse).collect_result_array(&arena).unwrap();
        assert_eq!(&[1, 2, 3], numbers.as_slice());

        match "1 x 3".split(' ').map(parse).collect_result_array(&arena) {
            Err(ParseError::Bad(token)) => assert_eq!("x", token),
            Err(ParseError::Alloc) => panic!("unexpected allocation failure"),
            Ok(array) => panic!("expected parse error, got {:?}", array),
        };
    }
}
