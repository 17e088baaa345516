use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A flag which another thread can set to ask a recognizer to stop. Recognizers check it at
/// decision boundaries and rule entry; a prediction already under way always completes first.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::CancellationFlag;
    use std::thread;

    #[test]
    fn test_cancel_across_threads() {
        let f = CancellationFlag::new();
        assert!(!f.is_cancelled());
        let g = f.clone();
        thread::spawn(move || g.cancel()).join().unwrap();
        assert!(f.is_cancelled());
        f.reset();
        assert!(!f.is_cancelled());
    }
}
