#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokio::runtime::Runtime;
use ws_receiver::config::ReceiverConfig;
use ws_receiver::receiver::Receiver;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    bytes: Vec<u8>,
    /// Offsets into `bytes` where `add()` is called again, simulating
    /// arbitrary network chunking rather than delivering the whole input in
    /// one call.
    splits: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let runtime = Runtime::new().unwrap();
    runtime.block_on(async move {
        let mut receiver = Receiver::new(ReceiverConfig {
            max_payload: 1 << 20,
            extensions: None,
        });
        receiver.on_text = Some(Box::new(|_| {}));
        receiver.on_binary = Some(Box::new(|_| {}));
        receiver.on_ping = Some(Box::new(|_| {}));
        receiver.on_pong = Some(Box::new(|_| {}));
        receiver.on_close = Some(Box::new(|_, _| {}));
        receiver.on_error = Some(Box::new(|_, _| {}));

        let mut offsets: Vec<usize> = input
            .splits
            .iter()
            .map(|b| *b as usize % (input.bytes.len() + 1))
            .collect();
        offsets.sort_unstable();
        offsets.dedup();

        let mut start = 0;
        for offset in offsets {
            receiver.add(&input.bytes[start..offset]).await;
            start = offset;
        }
        receiver.add(&input.bytes[start..]).await;
    });
});
