use super::*;
use crate::{
    delegate::DelegateError,
    library::{InitError, NetConfig, NetLibrary, SystemAllocator},
    message::{MessageIdentity, ReadBuffer},
    transport::{LoopbackReceiver, LoopbackTransport},
};
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
struct Chat {
    from: u32,
    text: String,
}

impl Message for Chat {
    fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        buffer.put_u32(self.from)?;
        buffer.put_str(&self.text)
    }

    fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        self.from = buffer.get_u32()?;
        self.text = buffer.get_str()?.to_owned();
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Kick {
    reason: u8,
}

impl Message for Kick {
    fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        buffer.put_u8(self.reason)
    }

    fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        self.reason = buffer.get_u8()?;
        Ok(())
    }

    fn reliable(&self) -> bool {
        false
    }
}

// shares the identity of Chat on purpose
#[derive(Debug, Default)]
struct Impostor;

impl Message for Impostor {
    fn encode(&self, _buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        Ok(())
    }

    fn decode(&mut self, _buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        Ok(())
    }
}

crate::declare! {
    message[10] Chat;
    message[11] Kick;
    message[10] Impostor;
}

#[derive(Default)]
struct Lobby {
    chats: parking_lot::Mutex<Vec<Chat>>,
    kicks: parking_lot::Mutex<Vec<Kick>>,
}

impl Lobby {
    fn on_chat(&self, chat: Chat) -> bool {
        self.chats.lock().push(chat);
        true
    }

    fn on_chat_quietly(&self, chat: Chat) -> bool {
        self.chats.lock().push(chat);
        false
    }

    fn on_kick(&self, kick: Kick) -> bool {
        self.kicks.lock().push(kick);
        true
    }

    fn on_impostor(&self, _: Impostor) -> bool {
        true
    }
}

fn open() -> (NetLibrary, Channel, LoopbackReceiver) {
    let library = NetLibrary::initialize(NetConfig::default()).unwrap();
    let (transport, receiver) = LoopbackTransport::pair(0);
    let channel = library
        .open_channel(NetAddress::Loopback(7000), Arc::new(transport))
        .unwrap();
    (library, channel, receiver)
}

fn hello() -> Chat {
    Chat {
        from: 42,
        text: "hello".to_owned(),
    }
}

#[test]
fn register_twice_fails_and_keeps_first() {
    let (_library, mut channel, mut receiver) = open();
    let lobby = Arc::new(Lobby::default());
    let first = Delegate::new(&lobby, Lobby::on_chat);
    let second = Delegate::new(&lobby, Lobby::on_chat_quietly);

    channel.register_message(first).unwrap();
    assert_eq!(
        channel.register_message(second),
        Err(RegistrationError::DuplicateRegistration {
            id: Chat::ID,
            name: "Chat"
        })
    );
    assert_eq!(channel.registered_count(), 1);

    channel.send(&hello()).unwrap();
    let frame = receiver.try_recv().unwrap();
    assert_eq!(channel.receive(&frame.bytes), Ok(Delivery::Handled(true)));
}

#[test]
fn unregister_requires_matching_handler() {
    let (_library, mut channel, _receiver) = open();
    let lobby = Arc::new(Lobby::default());
    let other = Arc::new(Lobby::default());
    let handler = Delegate::new(&lobby, Lobby::on_chat);

    assert_eq!(
        channel.unregister_message(&handler),
        Err(RegistrationError::UnregisteredHandler {
            id: Chat::ID,
            name: "Chat"
        })
    );

    channel.register_message(handler.clone()).unwrap();
    let mismatches = [
        Delegate::new(&other, Lobby::on_chat),
        Delegate::new(&lobby, Lobby::on_chat_quietly),
    ];
    for mismatch in &mismatches {
        assert_eq!(
            channel.unregister_message(mismatch),
            Err(RegistrationError::HandlerMismatch {
                id: Chat::ID,
                name: "Chat"
            })
        );
    }
    assert!(matches!(
        channel.unregister_message(&Delegate::new(&lobby, Lobby::on_impostor)),
        Err(RegistrationError::HandlerMismatch { .. })
    ));
    assert!(channel.is_registered(Chat::ID));

    channel.unregister_message(&handler).unwrap();
    assert!(!channel.is_registered(Chat::ID));
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_chat_quietly))
        .unwrap();
}

#[test]
fn receive_dispatches_to_registered_handler() {
    let (_library, mut channel, mut receiver) = open();
    let lobby = Arc::new(Lobby::default());
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_chat))
        .unwrap();
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_kick))
        .unwrap();

    channel.send(&hello()).unwrap();
    channel.send(&Kick { reason: 3 }).unwrap();

    let chat = receiver.try_recv().unwrap();
    assert!(chat.reliable);
    let kick = receiver.try_recv().unwrap();
    assert!(!kick.reliable);

    assert_eq!(channel.receive(&chat.bytes), Ok(Delivery::Handled(true)));
    assert_eq!(channel.receive(&kick.bytes), Ok(Delivery::Handled(true)));
    assert_eq!(*lobby.chats.lock(), vec![hello()]);
    assert_eq!(*lobby.kicks.lock(), vec![Kick { reason: 3 }]);

    let stats = channel.stats();
    assert_eq!(stats.messages_sent, 2);
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.bytes_sent, stats.bytes_received);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn receive_without_handler_is_dropped() {
    let (_library, mut channel, mut receiver) = open();
    let lobby = Arc::new(Lobby::default());
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_chat))
        .unwrap();

    channel.send(&Kick { reason: 1 }).unwrap();
    let frame = receiver.try_recv().unwrap();
    assert_eq!(
        channel.receive(&frame.bytes),
        Ok(Delivery::Dropped(Kick::ID))
    );
    assert_eq!(channel.stats().dropped, 1);
    assert!(lobby.chats.lock().is_empty());
    assert!(lobby.kicks.lock().is_empty());
}

#[test]
fn receive_reports_dead_handler() {
    let (_library, mut channel, mut receiver) = open();
    let lobby = Arc::new(Lobby::default());
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_chat))
        .unwrap();
    drop(lobby);

    channel.send(&hello()).unwrap();
    let frame = receiver.try_recv().unwrap();
    assert_eq!(
        channel.receive(&frame.bytes),
        Err(ChannelError::Dispatch(DispatchError::Delegate(
            DelegateError::TargetDropped
        )))
    );
}

#[test]
fn receive_rejects_unbound_handler() {
    let (_library, mut channel, mut receiver) = open();
    channel
        .register_message(MessageDelegate::<Lobby, Chat>::from_method(Lobby::on_chat))
        .unwrap();

    channel.send(&hello()).unwrap();
    let frame = receiver.try_recv().unwrap();
    assert_eq!(
        channel.receive(&frame.bytes),
        Err(ChannelError::Dispatch(DispatchError::Delegate(
            DelegateError::Unbound
        )))
    );
}

#[test]
fn receive_rejects_malformed_frames() {
    let (_library, mut channel, _receiver) = open();
    let lobby = Arc::new(Lobby::default());
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_kick))
        .unwrap();

    assert!(matches!(
        channel.receive(&[11, 0]),
        Err(ChannelError::Frame(FrameError::InsufficientData { .. }))
    ));
    // header says two payload bytes, Kick reads one
    assert!(matches!(
        channel.receive(&[11, 0, 0, 2, 0, 0, 0, 1, 1]),
        Err(ChannelError::Codec(CodecError::Invalid(_)))
    ));
    assert!(matches!(
        channel.receive(&[11, 0, 0, 0, 0, 0, 0]),
        Err(ChannelError::Codec(CodecError::Truncated { .. }))
    ));
    assert!(lobby.kicks.lock().is_empty());
}

#[test]
fn dispatcher_rejects_foreign_message() {
    let lobby = Arc::new(Lobby::default());
    let dispatcher: Box<dyn Dispatcher> = Box::new(Delegate::new(&lobby, Lobby::on_chat));
    assert_eq!(dispatcher.message_id(), Chat::ID);
    assert_eq!(
        dispatcher.dispatch(Box::new(Kick { reason: 0 })),
        Err(DispatchError::TypeMismatch {
            expected: Chat::ID,
            found: Kick::ID
        })
    );
    let message: Box<dyn NetMessage> = Box::new(hello());
    assert_eq!(message.handle(&*dispatcher), Ok(true));
}

#[test]
fn send_checks_size_and_transport() {
    let library = NetLibrary::initialize(
        NetConfig::default()
            .with_channel_config(ChannelConfig::default().with_max_payload_size(8)),
    )
    .unwrap();
    let (transport, mut receiver) = LoopbackTransport::pair(0);
    let channel = library
        .open_channel(NetAddress::None, Arc::new(transport))
        .unwrap();

    assert_eq!(
        channel.send_raw(&[0; 9]),
        Err(ChannelError::PayloadTooLarge { size: 9, max: 8 })
    );
    channel.send_raw(&[1, 2, 3]).unwrap();
    assert_eq!(&receiver.try_recv().unwrap().bytes[..], &[1, 2, 3]);

    let long = Chat {
        from: 1,
        text: "longer than eight".to_owned(),
    };
    assert!(matches!(
        channel.send(&long),
        Err(ChannelError::Codec(CodecError::Overflow { .. }))
    ));

    receiver.close();
    assert_eq!(
        channel.send(&Kick { reason: 1 }),
        Err(ChannelError::TransportUnavailable)
    );
    assert_eq!(channel.stats().messages_sent, 1);
}

#[test]
fn send_buffer_passes_frames_through() {
    let (_library, channel, mut receiver) = open();
    let mut buffer = WriteBuffer::new(64);
    encode_frame(&Kick { reason: 9 }, &mut buffer).unwrap();
    let frame = buffer.freeze();

    channel.send_buffer(frame.clone()).unwrap();
    let sent = receiver.try_recv().unwrap();
    assert_eq!(sent.bytes, frame);
    assert!(!sent.reliable);

    assert!(matches!(
        channel.send_buffer(Bytes::from_static(&[1, 2])),
        Err(ChannelError::Frame(_))
    ));
}

#[derive(Default)]
struct CountingAllocator {
    allocated: parking_lot::Mutex<usize>,
    freed: parking_lot::Mutex<usize>,
    last_size: parking_lot::Mutex<usize>,
}

impl BufferAllocator for CountingAllocator {
    fn allocate(
        &self,
        count: usize,
        size: usize,
        flags: i32,
    ) -> Result<bytes::BytesMut, AllocError> {
        *self.allocated.lock() += 1;
        *self.last_size.lock() = count * size;
        SystemAllocator.allocate(count, size, flags)
    }

    fn free(&self, _buffer: bytes::BytesMut) {
        *self.freed.lock() += 1;
    }
}

#[test]
fn send_uses_injected_allocator() {
    let allocator = Arc::new(CountingAllocator::default());
    let library = NetLibrary::initialize(
        NetConfig::default()
            .with_allocator(allocator.clone())
            .with_channel_config(ChannelConfig::default().with_max_payload_size(4)),
    )
    .unwrap();
    let (transport, _receiver) = LoopbackTransport::pair(0);
    let channel = library
        .open_channel(NetAddress::None, Arc::new(transport))
        .unwrap();
    // the probe in initialize
    assert_eq!(*allocator.allocated.lock(), 1);
    assert_eq!(*allocator.freed.lock(), 1);

    channel.send(&Kick { reason: 1 }).unwrap();
    assert_eq!(*allocator.allocated.lock(), 2);
    assert_eq!(*allocator.freed.lock(), 1);

    assert!(channel.send(&hello()).is_err());
    assert_eq!(*allocator.allocated.lock(), 3);
    assert_eq!(*allocator.freed.lock(), 2);
}

#[test]
fn failed_transmit_returns_buffer_to_allocator() {
    let allocator = Arc::new(CountingAllocator::default());
    let library =
        NetLibrary::initialize(NetConfig::default().with_allocator(allocator.clone())).unwrap();

    let (transport, mut receiver) = LoopbackTransport::pair(1);
    let channel = library
        .open_channel(NetAddress::None, Arc::new(transport))
        .unwrap();
    channel.send(&Kick { reason: 1 }).unwrap();
    assert_eq!(
        channel.send(&Kick { reason: 2 }),
        Err(ChannelError::Transport(TransportError::Full))
    );
    assert_eq!(*allocator.allocated.lock(), 3);
    assert_eq!(*allocator.freed.lock(), 2);

    receiver.close();
    assert_eq!(
        channel.send(&Kick { reason: 3 }),
        Err(ChannelError::TransportUnavailable)
    );
    assert_eq!(*allocator.allocated.lock(), 4);
    assert_eq!(*allocator.freed.lock(), 3);
    assert_eq!(channel.stats().messages_sent, 1);
}

#[test]
fn oversized_frame_capacity_is_rejected_or_clamped() {
    let oversized = ChannelConfig::default().with_frame_capacity(usize::MAX);
    assert_eq!(
        oversized.validate(),
        Err("frame_capacity must be at most u32::MAX")
    );
    assert!(matches!(
        NetLibrary::initialize(NetConfig::default().with_channel_config(oversized.clone())),
        Err(InitError::InvalidParameter(_))
    ));

    let allocator = Arc::new(CountingAllocator::default());
    let library =
        NetLibrary::initialize(NetConfig::default().with_allocator(allocator.clone())).unwrap();
    let (transport, mut receiver) = LoopbackTransport::pair(0);
    let mut channel = library
        .open_channel(NetAddress::None, Arc::new(transport))
        .unwrap();
    assert_eq!(
        channel.set_properties(oversized),
        Err(ChannelError::InvalidConfig(
            "frame_capacity must be at most u32::MAX"
        ))
    );
    channel
        .set_properties(
            ChannelConfig::default()
                .with_max_payload_size(64)
                .with_frame_capacity(u32::MAX as usize),
        )
        .unwrap();
    channel.send(&Kick { reason: 4 }).unwrap();
    assert_eq!(*allocator.last_size.lock(), HEADER_SIZE + 64);
    assert!(receiver.try_recv().is_some());
}

#[test]
fn userdata_slots() {
    let (_library, mut channel, _receiver) = open();
    for index in 0..USERDATA_SLOTS {
        assert!(channel.userdata(index).unwrap().is_none());
    }
    assert_eq!(
        channel.userdata(USERDATA_SLOTS).unwrap_err(),
        ChannelError::UserDataIndex { index: 8 }
    );

    let previous = channel
        .set_userdata(3, Some(Arc::new(String::from("session"))))
        .unwrap();
    assert!(previous.is_none());
    assert_eq!(
        channel.userdata_as::<String>(3).as_deref(),
        Some(&String::from("session"))
    );
    assert!(channel.userdata_as::<u32>(3).is_none());

    let previous = channel.set_userdata(3, None).unwrap();
    assert!(previous.is_some());
    assert!(channel.set_userdata(8, None).is_err());
}

#[test]
fn properties_and_info() {
    let (_library, mut channel, _receiver) = open();
    assert_eq!(channel.address(), NetAddress::Loopback(7000));
    assert_eq!(channel.address().port(), Some(7000));
    channel.set_address(NetAddress::Broadcast(7001));

    assert_eq!(
        channel.set_properties(ChannelConfig::default().with_max_payload_size(0)),
        Err(ChannelError::InvalidConfig(
            "max_payload_size must be in 1..=u32::MAX"
        ))
    );
    channel
        .set_properties(ChannelConfig::default().with_max_payload_size(16))
        .unwrap();
    assert_eq!(channel.config().max_payload_size, 16);

    let lobby = Arc::new(Lobby::default());
    channel
        .register_message(Delegate::new(&lobby, Lobby::on_kick))
        .unwrap();
    let info = channel.channel_info();
    assert_eq!(info.address.to_string(), "broadcast:7001");
    assert_eq!(info.handlers, 1);
    assert_eq!(info.stats, ChannelStats::default());
}

#[test]
fn throughput_is_a_rolling_average() {
    let start = Instant::now();
    let mut recorder = StatsRecorder::new(0.125);
    recorder.sample(100, start);
    assert_eq!(recorder.snapshot().avg_bytes_per_sec, 0.0);
    // the bytes that started the clock are not part of the first interval
    recorder.sample(100, start + Duration::from_secs(1));
    assert_eq!(recorder.snapshot().avg_bytes_per_sec, 100.0);
    recorder.sample(0, start + Duration::from_secs(2));
    assert_eq!(recorder.snapshot().avg_bytes_per_sec, 87.5);
    // same instant, accumulated into the next sample
    recorder.sample(50, start + Duration::from_secs(2));
    assert_eq!(recorder.snapshot().avg_bytes_per_sec, 87.5);
    recorder.sample(0, start + Duration::from_secs(3));
    assert_eq!(recorder.snapshot().avg_bytes_per_sec, 82.8125);
}
