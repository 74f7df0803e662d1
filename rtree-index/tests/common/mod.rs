//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::Rng;
use rtree_index::{BoundingBox, SpatialResult};
use tempfile::TempDir;

/// Runs a test between a setup and a cleanup step, reporting failures of
/// each phase separately. Cleanup runs even when the test body fails.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: FnOnce() -> SpatialResult<TestContext>,
    T: FnOnce(&TestContext) -> SpatialResult<()>,
    A: FnOnce(TestContext) -> SpatialResult<()>,
{
    init_logger();
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };
    let test_result = test(&ctx);
    let after_result = after(ctx);
    if let Err(e) = test_result {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestContext {
    dir: TempDir,
    envelope: BoundingBox,
}

impl TestContext {
    pub fn envelope(&self) -> BoundingBox {
        self.envelope
    }

    /// Path of a file inside the scratch directory of this test.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn create_test_context() -> SpatialResult<TestContext> {
    Ok(TestContext {
        dir: tempfile::tempdir()?,
        envelope: BoundingBox::new(0.0, 0.0, 1000.0, 1000.0),
    })
}

pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    ctx.dir.close()?;
    Ok(())
}

/// Random box of at most `max_size` per side, placed inside `envelope`.
pub fn random_box(rng: &mut StdRng, envelope: &BoundingBox, max_size: f64) -> BoundingBox {
    let w = rng.gen_range(0.0..max_size);
    let h = rng.gen_range(0.0..max_size);
    let x = rng.gen_range(envelope.min_x..envelope.max_x - w);
    let y = rng.gen_range(envelope.min_y..envelope.max_y - h);
    BoundingBox::new(x, y, x + w, y + h)
}

pub fn random_items(
    rng: &mut StdRng,
    envelope: &BoundingBox,
    count: u32,
    max_size: f64,
) -> Vec<(BoundingBox, u32)> {
    (0..count)
        .map(|id| (random_box(rng, envelope, max_size), id))
        .collect()
}

/// Ids of every item whose box intersects `window`, found by a full scan.
pub fn linear_scan(items: &[(BoundingBox, u32)], window: &BoundingBox) -> Vec<u32> {
    let mut ids: Vec<u32> = items
        .iter()
        .filter(|(bbox, _)| bbox.intersects(window))
        .map(|(_, id)| *id)
        .collect();
    ids.sort_unstable();
    ids
}

pub fn sorted<T: Ord>(mut values: Vec<T>) -> Vec<T> {
    values.sort();
    values
}
