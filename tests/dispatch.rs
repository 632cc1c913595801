use netdelegate::{
    channel::{Channel, Delivery, NetAddress},
    delegate::{Delegate, MulticastDelegate},
    library::{NetConfig, NetLibrary},
    message::{CodecError, Message, MessageIdentity, ReadBuffer, WriteBuffer},
    transport::{LoopbackReceiver, LoopbackTransport},
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq)]
struct Move {
    entity: u32,
    x: i32,
    y: i32,
}

impl Message for Move {
    fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        buffer.put_u32(self.entity)?;
        buffer.put_i32(self.x)?;
        buffer.put_i32(self.y)
    }

    fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        self.entity = buffer.get_u32()?;
        self.x = buffer.get_i32()?;
        self.y = buffer.get_i32()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Despawn {
    entity: u32,
}

impl Message for Despawn {
    fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        buffer.put_u32(self.entity)
    }

    fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        self.entity = buffer.get_u32()?;
        Ok(())
    }
}

netdelegate::declare! {
    message[5] Move;
    message[6] Despawn;
}

#[derive(Default)]
struct World {
    moves: Mutex<Vec<Move>>,
    observers: MulticastDelegate<Observer, Move, bool>,
}

impl World {
    fn on_move(&self, msg: Move) -> bool {
        self.moves.lock().push(msg.clone());
        self.observers.invoke(msg).unwrap_or(None).unwrap_or(true)
    }
}

#[derive(Default)]
struct Observer {
    seen: Mutex<Vec<(u8, u32)>>,
}

impl Observer {
    fn first(&self, msg: Move) -> bool {
        self.seen.lock().push((1, msg.entity));
        true
    }

    fn second(&self, msg: Move) -> bool {
        self.seen.lock().push((2, msg.entity));
        false
    }
}

fn pump(channel: &Channel, receiver: &mut LoopbackReceiver) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    while let Some(frame) = receiver.try_recv() {
        deliveries.push(channel.receive(&frame.bytes).unwrap());
    }
    deliveries
}

#[test]
fn registered_identity_is_handled_and_unregistered_is_dropped() {
    let library = NetLibrary::initialize(NetConfig::default()).unwrap();
    let (transport, mut receiver) = LoopbackTransport::pair(0);
    let mut channel = library
        .open_channel(NetAddress::Loopback(5000), Arc::new(transport))
        .unwrap();

    let world = Arc::new(World::default());
    channel
        .register_message(Delegate::new(&world, World::on_move))
        .unwrap();

    let sent = Move {
        entity: 7,
        x: -3,
        y: 12,
    };
    channel.send(&sent).unwrap();
    assert_eq!(pump(&channel, &mut receiver), vec![Delivery::Handled(true)]);
    assert_eq!(*world.moves.lock(), vec![sent]);

    channel.send(&Despawn { entity: 7 }).unwrap();
    assert_eq!(
        pump(&channel, &mut receiver),
        vec![Delivery::Dropped(Despawn::ID)]
    );
    assert_eq!(world.moves.lock().len(), 1);
    assert_eq!(channel.stats().dropped, 1);

    drop(channel);
    library.deinitialize().unwrap();
}

#[test]
fn handler_fans_out_to_observers() {
    let library = NetLibrary::initialize(NetConfig::default()).unwrap();
    let (transport, mut receiver) = LoopbackTransport::pair(16);
    let mut channel = library
        .open_channel(NetAddress::Loopback(5001), Arc::new(transport))
        .unwrap();

    let world = Arc::new(World::default());
    let observer = Arc::new(Observer::default());
    let first = Delegate::new(&observer, Observer::first);
    let second = Delegate::new(&observer, Observer::second);
    world.observers.add(first.clone()).unwrap();
    world.observers.add(second.clone()).unwrap();

    let handler = Delegate::new(&world, World::on_move);
    channel.register_message(handler.clone()).unwrap();

    channel.send(&Move { entity: 1, x: 0, y: 0 }).unwrap();
    assert_eq!(pump(&channel, &mut receiver), vec![Delivery::Handled(false)]);

    assert!(world.observers.remove(&second));
    channel.send(&Move { entity: 2, x: 0, y: 0 }).unwrap();
    assert_eq!(pump(&channel, &mut receiver), vec![Delivery::Handled(true)]);

    assert_eq!(*observer.seen.lock(), vec![(1, 1), (2, 1), (1, 2)]);

    channel.unregister_message(&handler).unwrap();
    channel.send(&Move { entity: 3, x: 0, y: 0 }).unwrap();
    assert_eq!(
        pump(&channel, &mut receiver),
        vec![Delivery::Dropped(Move::ID)]
    );
}
