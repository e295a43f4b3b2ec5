/// Transform applied to every engine result before it is encoded.
pub trait PostProcess<T>: Send + Sync + 'static {
    fn apply(&self, output: T) -> T;
}

/// Leaves results untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl<T> PostProcess<T> for Identity {
    fn apply(&self, output: T) -> T {
        output
    }
}

impl<T, F> PostProcess<T> for F
where
    F: Fn(T) -> T + Send + Sync + 'static,
{
    fn apply(&self, output: T) -> T {
        self(output)
    }
}
