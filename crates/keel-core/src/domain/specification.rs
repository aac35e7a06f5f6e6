//! Specification pattern: composable predicates over domain objects.

/// A business rule a candidate either satisfies or not.
pub trait Specification<T: ?Sized> {
    fn is_satisfied_by(&self, candidate: &T) -> bool;

    fn and<S>(self, other: S) -> And<Self, S>
    where
        Self: Sized,
        S: Specification<T>,
    {
        And(self, other)
    }

    fn or<S>(self, other: S) -> Or<Self, S>
    where
        Self: Sized,
        S: Specification<T>,
    {
        Or(self, other)
    }

    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }

    /// Keep the candidates that satisfy this specification.
    fn select<'a, I>(&self, candidates: I) -> Vec<&'a T>
    where
        Self: Sized,
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        candidates
            .into_iter()
            .filter(|c| self.is_satisfied_by(c))
            .collect()
    }
}

/// Both must hold.
#[derive(Debug, Clone, Copy)]
pub struct And<A, B>(A, B);

/// Either may hold.
#[derive(Debug, Clone, Copy)]
pub struct Or<A, B>(A, B);

/// Inverts the inner specification.
#[derive(Debug, Clone, Copy)]
pub struct Not<A>(A);

/// Specification backed by a closure. Build with [`spec_fn`].
#[derive(Clone, Copy)]
pub struct FnSpec<F>(F);

/// Wrap a predicate closure as a [`Specification`].
pub fn spec_fn<T: ?Sized, F: Fn(&T) -> bool>(predicate: F) -> FnSpec<F> {
    FnSpec(predicate)
}

impl<T: ?Sized, A: Specification<T>, B: Specification<T>> Specification<T> for And<A, B> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.0.is_satisfied_by(candidate) && self.1.is_satisfied_by(candidate)
    }
}

impl<T: ?Sized, A: Specification<T>, B: Specification<T>> Specification<T> for Or<A, B> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.0.is_satisfied_by(candidate) || self.1.is_satisfied_by(candidate)
    }
}

impl<T: ?Sized, A: Specification<T>> Specification<T> for Not<A> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        !self.0.is_satisfied_by(candidate)
    }
}

impl<T: ?Sized, F: Fn(&T) -> bool> Specification<T> for FnSpec<F> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (self.0)(candidate)
    }
}

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for Box<S> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (**self).is_satisfied_by(candidate)
    }
}
