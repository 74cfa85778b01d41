//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod event_recorder;

use derive_new::new;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::Sender;
use tracing::{Instrument, debug_span};
use velo_utils::ibus::{IbusChannelsTx, IbusMsg, IbusReceiver, IbusSender};
use velo_utils::protocol::Protocol;
use velo_utils::task::Task;

use crate::event_recorder::EventRecorder;

/// A trait for protocol instances.
pub trait ProtocolInstance
where
    Self: Send,
{
    /// Protocol type.
    const PROTOCOL: Protocol;

    type ProtocolInputMsg: Send + std::fmt::Debug + Serialize + DeserializeOwned;
    type ProtocolOutputMsg: Send + std::fmt::Debug + Serialize;
    type ProtocolInputChannelsTx;
    type ProtocolInputChannelsRx: MessageReceiver<Self::ProtocolInputMsg>;

    /// Create protocol instance.
    fn new(
        name: String,
        shared: InstanceShared,
        channels_tx: InstanceChannelsTx<Self>,
    ) -> Self
    where
        Self: Sized;

    /// Optional protocol instance initialization routine.
    fn init(&mut self) {}

    /// Optional protocol instance shutdown routine.
    fn shutdown(self)
    where
        Self: Sized,
    {
    }

    /// Process ibus message.
    fn process_ibus_msg(&mut self, msg: IbusMsg);

    /// Process protocol message.
    fn process_protocol_msg(&mut self, msg: Self::ProtocolInputMsg);

    /// Create channels for all protocol input events.
    fn protocol_input_channels()
    -> (Self::ProtocolInputChannelsTx, Self::ProtocolInputChannelsRx);

    /// Return the tracing span of the protocol instance.
    fn debug_span(name: &str) -> tracing::Span {
        debug_span!("instance", protocol = %Self::PROTOCOL, %name)
    }

    /// Return test directory used for unit testing.
    #[cfg(feature = "testing")]
    fn test_dir() -> String;
}

/// Shared data among all protocol instances.
#[derive(Clone, Debug, Default, new)]
pub struct InstanceShared {
    // Hostname.
    pub hostname: Option<String>,
    // Event recorder configuration.
    pub event_recorder_config: Option<event_recorder::Config>,
}

/// Instance input message.
#[derive(Debug, Deserialize, Serialize)]
pub enum InstanceMsg<P: ProtocolInstance> {
    Ibus(IbusMsg),
    Protocol(P::ProtocolInputMsg),
}

/// Instance output channels.
#[derive(Debug, new)]
pub struct InstanceChannelsTx<P: ProtocolInstance> {
    pub ibus: IbusChannelsTx,
    pub protocol_input: P::ProtocolInputChannelsTx,
    #[cfg(feature = "testing")]
    pub protocol_output: Sender<P::ProtocolOutputMsg>,
}

/// Instance input channels.
#[derive(Debug, new)]
pub struct InstanceChannelsRx<P: ProtocolInstance> {
    pub ibus: IbusReceiver,
    pub protocol_input: P::ProtocolInputChannelsRx,
}

pub trait MessageReceiver<T: Send>
where
    Self: Send,
{
    fn recv(&mut self) -> impl Future<Output = Option<T>> + Send;
}

// ===== helper functions =====

// Protocol instance input-event aggregator.
fn event_aggregator<P>(
    mut instance_channels_rx: InstanceChannelsRx<P>,
    agg_tx: Sender<InstanceMsg<P>>,
) -> Task<()>
where
    P: ProtocolInstance + 'static,
{
    Task::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                msg = instance_channels_rx.ibus.recv() => {
                    match msg {
                        Some(msg) => InstanceMsg::Ibus(msg),
                        // The ibus was closed: the instance is being
                        // unconfigured.
                        None => break,
                    }
                }
                Some(msg) = instance_channels_rx.protocol_input.recv() => {
                    InstanceMsg::Protocol(msg)
                }
            };

            if agg_tx.send(msg).await.is_err() {
                break;
            }
        }
    })
}

async fn event_loop<P>(
    instance: &mut P,
    instance_channels_rx: InstanceChannelsRx<P>,
    mut event_recorder: Option<EventRecorder>,
) where
    P: ProtocolInstance + 'static,
{
    let (agg_tx, mut agg_rx) = mpsc::channel(4);

    // Spawn event aggregator task.
    let _event_aggregator = event_aggregator(instance_channels_rx, agg_tx);

    // Main event loop.
    loop {
        // Receive event message. The loop ends once the aggregator detects
        // the instance is being shut down and closes its channel.
        let Some(msg) = agg_rx.recv().await else {
            return;
        };

        // Record event message.
        if let Some(event_recorder) = &mut event_recorder {
            event_recorder.record(&msg);
        }

        // Process event message.
        match msg {
            InstanceMsg::Ibus(msg) => {
                instance.process_ibus_msg(msg);
            }
            InstanceMsg::Protocol(msg) => {
                instance.process_protocol_msg(msg);
            }
        }
    }
}

async fn run<P>(
    name: String,
    ibus_tx: IbusChannelsTx,
    ibus_instance_rx: IbusReceiver,
    #[cfg(feature = "testing")] proto_output_tx: Sender<P::ProtocolOutputMsg>,
    shared: InstanceShared,
) where
    P: ProtocolInstance + 'static,
{
    // Start protocol channels.
    let (proto_input_tx, proto_input_rx) = P::protocol_input_channels();

    // Create instance Tx/Rx channels.
    let instance_channels_tx = InstanceChannelsTx::new(
        ibus_tx.clone(),
        proto_input_tx,
        #[cfg(feature = "testing")]
        proto_output_tx,
    );
    let instance_channels_rx =
        InstanceChannelsRx::new(ibus_instance_rx, proto_input_rx);

    // Get event recorder.
    let event_recorder = shared
        .event_recorder_config
        .clone()
        .filter(|config| config.enabled)
        .and_then(|config| EventRecorder::new(P::PROTOCOL, &name, config));

    // Create protocol instance.
    let mut instance = P::new(name, shared, instance_channels_tx);
    instance.init();

    // Run event loop.
    event_loop(&mut instance, instance_channels_rx, event_recorder).await;

    // Cancel ibus subscriptions.
    ibus_tx.disconnect();

    // Ensure instance is shut down before exiting.
    instance.shutdown();
}

// ===== global functions =====

pub fn spawn_protocol_task<P>(
    name: String,
    ibus_tx: &IbusChannelsTx,
    ibus_instance_tx: IbusSender,
    ibus_instance_rx: IbusReceiver,
    #[cfg(feature = "testing")] proto_output_tx: Sender<P::ProtocolOutputMsg>,
    shared: InstanceShared,
) -> Task<()>
where
    P: ProtocolInstance + 'static,
{
    let ibus_tx = IbusChannelsTx::with_subscriber(ibus_tx, ibus_instance_tx);
    let span = P::debug_span(&name);
    let fut = async move {
        run::<P>(
            name,
            ibus_tx,
            ibus_instance_rx,
            #[cfg(feature = "testing")]
            proto_output_tx,
            shared,
        )
        .await;
    }
    .instrument(span);

    // In testing, protocol instances are spawned as async tasks so they run
    // under Tokio's single-threaded cooperative scheduler. This ensures
    // deterministic ordering of message send/receive operations.
    //
    // In production, processing individual events in the main protocol task
    // may take longer than is appropriate for async tasks. To avoid starving
    // other tasks on the cooperative scheduler, protocol instances are spawned
    // as blocking tasks backed by OS threads, relying on the OS for preemptive
    // scheduling.
    #[cfg(not(feature = "testing"))]
    {
        Task::spawn_blocking(|| {
            tokio::runtime::Handle::current().block_on(fut)
        })
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(fut)
    }
}
