// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

/// An `Updater` applies one `Diff` to the replicated `Value`.
///
/// Every member runs the same updater over the same sequence of diffs, so it
/// must be deterministic: equal `(diff, value)` inputs have to produce equal
/// outputs on every replica. Reading clocks, randomness or any other
/// process-local state makes replicas drift apart silently; nothing in the
/// protocol detects it.
///
/// Any `Fn(&D, &mut V)` is an updater, including plain `fn` pointers, which
/// are also `Clone + Hash + Eq` and so keep a `Member` model-checkable.
pub trait Updater<D, V> {
    fn update(&self, diff: &D, value: &mut V);
}

impl<D, V, F> Updater<D, V> for F
where
    F: Fn(&D, &mut V),
{
    fn update(&self, diff: &D, value: &mut V) {
        self(diff, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(d: &i64, v: &mut i64) {
        *v += *d;
    }

    fn run<U: Updater<i64, i64>>(u: &U, diff: i64, value: &mut i64) {
        u.update(&diff, value)
    }

    #[test]
    fn fn_pointers_and_closures_are_updaters() {
        let mut v = 1;
        run(&add, 4, &mut v);
        assert_eq!(v, 5);

        let scale = 3;
        let mul = move |d: &i64, v: &mut i64| *v *= d * scale;
        run(&mul, 2, &mut v);
        assert_eq!(v, 30);
    }
}
