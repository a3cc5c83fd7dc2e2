/*!
# dockfleet devkit - in-memory fakes for tests

Lets the kernel and directory code run without etcd or a Docker daemon:
- `MemoryDirectory`: a `DirectoryStore` with injectable latency and failures
- `FakeConnector` / `FakeRuntime`: a runtime that records every call
- `FixedClock`: a settable clock
- `TestHarness`: all of the above wired together
*/

pub mod fake_runtime;
pub mod memory_store;
pub mod test_utils;

pub use fake_runtime::{FakeConnector, FakeRuntime};
pub use memory_store::MemoryDirectory;
pub use test_utils::{sample_record, FixedClock, TestHarness};
