#![no_main]
use libfuzzer_sys::fuzz_target;

use cordyceps_freetree::model::{run_model_equivalence, Op};

fuzz_target!(|ops: Vec<Op>| {
    let _ = env_logger::try_init();
    run_model_equivalence(ops)
});
