use netdelegate::{
    channel::{Delivery, NetAddress},
    delegate::Delegate,
    library::{NetConfig, NetLibrary},
    message::{CodecError, Message, ReadBuffer, WriteBuffer},
    transport::LoopbackTransport,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug, Default)]
struct Greeting {
    from: String,
    text: String,
}

impl Message for Greeting {
    fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        buffer.put_str(&self.from)?;
        buffer.put_str(&self.text)
    }

    fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        self.from = buffer.get_str()?.to_owned();
        self.text = buffer.get_str()?.to_owned();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Goodbye;

impl Message for Goodbye {
    fn encode(&self, _buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        Ok(())
    }

    fn decode(&mut self, _buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        Ok(())
    }
}

netdelegate::declare! {
    message[1] Greeting;
    message[2] Goodbye;
}

#[derive(Default)]
struct Greeter {
    greeted: AtomicUsize,
}

impl Greeter {
    fn on_greeting(&self, msg: Greeting) -> bool {
        let n = self.greeted.fetch_add(1, Ordering::Relaxed) + 1;
        println!("#{} {} says {:?}", n, msg.from, msg.text);
        true
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let library = NetLibrary::initialize(NetConfig::default())?;
    let (transport, mut receiver) = LoopbackTransport::pair(0);
    let mut channel = library.open_channel(NetAddress::Loopback(7777), Arc::new(transport))?;

    let greeter = Arc::new(Greeter::default());
    let handler = Delegate::new(&greeter, Greeter::on_greeting);
    channel.register_message(handler.clone())?;

    for from in ["alice", "bob"] {
        channel.send(&Greeting {
            from: from.to_owned(),
            text: "hello".to_owned(),
        })?;
    }
    channel.send(&Goodbye)?;

    for _ in 0..3 {
        let frame = receiver.recv().await.ok_or("transport closed")?;
        match channel.receive(&frame.bytes)? {
            Delivery::Handled(result) => println!("handled: {}", result),
            Delivery::Dropped(id) => println!("dropped {}", id),
        }
    }

    channel.unregister_message(&handler)?;
    println!("{:#?}", channel.channel_info());

    drop(channel);
    library.deinitialize()?;
    Ok(())
}
