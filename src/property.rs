use std::fmt::Debug;

/// Outcome of [BoundedProperty::set].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    /// The requested value was stored as is.
    Exact,
    /// The requested value was out of range and a bound (or the previous value) was stored instead.
    Clamped,
}

impl Clamp {
    pub fn is_clamped(self) -> bool {
        self == Self::Clamped
    }

    /// Combines two outcomes, staying `Clamped` if either was.
    pub fn and(self, other: Clamp) -> Clamp {
        if self.is_clamped() || other.is_clamped() {
            Self::Clamped
        } else {
            Self::Exact
        }
    }
}

/// A value constrained to a device-reported range, mirroring a hardware-adjustable setting.
///
/// The invariant `min <= val <= max` holds after every `update` and `set`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedProperty<T> {
    min: T,
    max: T,
    current: T,
}

impl<T: PartialOrd + Copy + Debug> BoundedProperty<T> {
    /// Creates a property, clamping `current` into `[min, max]`.
    pub fn new(min: T, max: T, current: T) -> Self {
        let mut prop = Self::single(min);
        prop.update(min, max);
        let _ = prop.set(current);
        prop
    }

    /// Creates a property pinned to a single value.
    pub fn single(value: T) -> Self {
        Self {
            min: value,
            max: value,
            current: value,
        }
    }

    /// Replaces the bounds. Reversed bounds are swapped.
    /// The current value is pulled into the new range if it falls outside.
    pub fn update(&mut self, min: T, max: T) {
        let (min, max) = if max < min { (max, min) } else { (min, max) };

        self.min = min;
        self.max = max;

        let (value, _) = self.clamp(self.current);
        self.current = if value >= min && value <= max {
            value
        } else {
            min
        };
    }

    /// Stores `value` clamped to the bounds.
    pub fn set(&mut self, value: T) -> Clamp {
        let (value, clamp) = self.clamp(value);
        self.current = value;
        clamp
    }

    pub fn val(&self) -> T {
        self.current
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    fn clamp(&self, value: T) -> (T, Clamp) {
        if value < self.min {
            (self.min, Clamp::Clamped)
        } else if value > self.max {
            (self.max, Clamp::Clamped)
        } else if value >= self.min {
            (value, Clamp::Exact)
        } else {
            // unordered (NaN)
            (self.current, Clamp::Clamped)
        }
    }
}

impl<T: PartialOrd + Copy + Debug + Default> Default for BoundedProperty<T> {
    fn default() -> Self {
        Self::single(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holds<T: PartialOrd + Copy + Debug>(p: &BoundedProperty<T>) -> bool {
        p.min() <= p.val() && p.val() <= p.max()
    }

    #[test]
    fn update_pulls_current_into_range() {
        let mut p = BoundedProperty::new(0, 100, 50);

        p.update(60, 80);
        assert_eq!(p.val(), 60);
        assert!(holds(&p));

        p.update(0, 10);
        assert_eq!(p.val(), 10);
        assert!(holds(&p));

        p.update(-5, 20);
        assert_eq!(p.val(), 10);
    }

    #[test]
    fn update_keeps_invariant_over_many_ranges() {
        let mut p = BoundedProperty::new(0.0, 1.0, 0.5);

        for (lo, hi) in [(2.0, 3.0), (-1.0, -0.5), (4.0, 1.0), (0.0, 0.0), (-10.0, 10.0)] {
            p.update(lo, hi);
            assert!(holds(&p), "{p:?} after update({lo}, {hi})");
        }
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let mut p = BoundedProperty::single(5);
        p.update(10, 1);
        assert_eq!((p.min(), p.max(), p.val()), (1, 10, 5));
    }

    #[test]
    fn set_reports_clamping() {
        let mut gain = BoundedProperty::new(0.0, 24.0, 0.0);

        assert_eq!(gain.set(12.5), Clamp::Exact);
        assert_eq!(gain.val(), 12.5);

        assert_eq!(gain.set(30.0), Clamp::Clamped);
        assert_eq!(gain.val(), 24.0);

        assert_eq!(gain.set(-1.0), Clamp::Clamped);
        assert_eq!(gain.val(), 0.0);
    }

    #[test]
    fn nan_keeps_previous_value() {
        let mut p = BoundedProperty::new(0.0, 10.0, 3.0);
        assert!(p.set(f64::NAN).is_clamped());
        assert_eq!(p.val(), 3.0);
    }

    #[test]
    fn single_is_pinned() {
        let mut bpp = BoundedProperty::single(8);
        assert!(bpp.set(16).is_clamped());
        assert_eq!(bpp.val(), 8);
    }
}
