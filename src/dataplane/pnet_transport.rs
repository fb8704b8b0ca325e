//! Raw Ethernet I/O through `pnet` datalink channels.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, anyhow, bail};
use log::{debug, error, info};
use pnet::datalink::{self, Channel, DataLinkSender};
use tokio::sync::mpsc;

use super::{PacketTransport, ReceivedFrame};
use crate::error::{Result, RouterError};

/// One Ethernet channel per interface. Received frames are forwarded to the
/// async side by a reader thread per interface.
pub struct ChannelTransport {
    senders: HashMap<String, Mutex<Box<dyn DataLinkSender>>>,
}

impl ChannelTransport {
    pub fn open(names: &[String], frames: mpsc::Sender<ReceivedFrame>) -> anyhow::Result<Self> {
        let available = datalink::interfaces();
        let mut senders = HashMap::new();

        for name in names {
            let iface = available
                .iter()
                .find(|i| &i.name == name)
                .ok_or_else(|| anyhow!("interface {} not found", name))?;

            let (tx, mut rx) = match datalink::channel(iface, Default::default())
                .with_context(|| format!("opening datalink channel on {}", name))?
            {
                Channel::Ethernet(tx, rx) => (tx, rx),
                _ => bail!("unsupported channel type on {}", name),
            };

            let interface = name.clone();
            let frames = frames.clone();
            thread::Builder::new()
                .name(format!("rx-{}", name))
                .spawn(move || {
                    loop {
                        match rx.next() {
                            Ok(data) => {
                                let frame = ReceivedFrame {
                                    interface: interface.clone(),
                                    data: data.to_vec(),
                                };
                                if frames.blocking_send(frame).is_err() {
                                    debug!("Receiver for {} dropped, reader exiting", interface);
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Read error on {}: {}", interface, e);
                                break;
                            }
                        }
                    }
                })
                .with_context(|| format!("spawning reader for {}", name))?;

            info!("Opened datalink channel on {}", name);
            senders.insert(name.clone(), Mutex::new(tx));
        }

        Ok(Self { senders })
    }
}

impl PacketTransport for ChannelTransport {
    fn send(&self, interface: &str, frame: &[u8]) -> Result<()> {
        let sender = self
            .senders
            .get(interface)
            .ok_or_else(|| RouterError::UnknownInterface(interface.to_string()))?;

        let mut tx = sender.lock().map_err(|_| RouterError::Transport {
            interface: interface.to_string(),
            reason: "sender lock poisoned".into(),
        })?;

        match tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(RouterError::Transport {
                interface: interface.to_string(),
                reason: e.to_string(),
            }),
            None => Err(RouterError::Transport {
                interface: interface.to_string(),
                reason: "send buffer unavailable".into(),
            }),
        }
    }
}
