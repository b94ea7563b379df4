//! Remote clipboard exchange. The wire transport (and its crypto framing)
//! lives outside this crate; a worker thread feeds incoming suggestions
//! through an mpsc channel, and the coordinator applies them to per-peer
//! histories on the event-loop thread. State shared with the UI loop is
//! never touched from the worker thread directly.

use anyhow::{anyhow, Context, Result};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use crate::clipboard::SelectionBridge;
use crate::menu::picker::{MenuEntry, Popup, PopupOptions};
use crate::models::{DedupHistory, HistoryHandle, Item, Producer, Truncation};
use crate::platform::{HotkeyBinder, Notifier};
use crate::storage::PluginOptions;

const SEND_BINDING: &str = "<Ctrl><Alt>P";
const ACCEPT_BINDING: &str = "<Ctrl><Alt>X";
const USER_HISTORY_BINDING: &str = "<Ctrl><Alt>D";
const DEFAULT_PORT: u16 = 6789;

/// Split `host[:port]`, defaulting the port.
pub fn host_port(value: &str) -> Result<(String, u16)> {
    match value.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid port in peer address {:?}", value))?;
            Ok((host.to_string(), port))
        }
        None => Ok((value.to_string(), DEFAULT_PORT)),
    }
}

/// Network identity of an exchange partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// One configured exchange partner, with its own bounded history of the
/// suggestions it has sent us.
pub struct Peer {
    pub addr: PeerAddress,
    pub history: HistoryHandle,
}

/// Message marshalled from the transport worker onto the loop thread.
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    /// A peer suggested `text` for our clipboard.
    Suggest { peer: String, text: String },
}

/// Outgoing half of the exchange protocol. Implementations belong to the
/// excluded network layer.
pub trait SuggestSink {
    fn suggest(&self, peer: &PeerAddress, text: &str) -> Result<()>;
}

/// Sink used when no transport is attached; the suggestion goes to the log
/// and nowhere else.
pub struct LogSuggestSink;

impl SuggestSink for LogSuggestSink {
    fn suggest(&self, peer: &PeerAddress, text: &str) -> Result<()> {
        log::info!(
            "No exchange transport; would suggest {} chars to {} ({}:{})",
            text.len(),
            peer.name,
            peer.host,
            peer.port
        );
        Ok(())
    }
}

/// Applies incoming suggestions to per-peer histories, tracks the current
/// suggestion, and offers popup items for sending the main history's top
/// entry to a peer or browsing per-peer histories.
pub struct ExchangeCoordinator {
    peers: Vec<Peer>,
    tx: Sender<ExchangeEvent>,
    rx: Receiver<ExchangeEvent>,
    current: RefCell<Option<usize>>,
    history: HistoryHandle,
    popup: Popup,
    notifier: Rc<dyn Notifier>,
    truncation: Truncation,
    send_shortcut: String,
    accept_shortcut: String,
    user_history_shortcut: String,
}

impl ExchangeCoordinator {
    /// Build the peer table from `user.<name> = host[:port]` options. Each
    /// peer gets a dedup history with the same capacity options as the
    /// coordinator itself.
    pub fn new(
        options: &PluginOptions,
        history: HistoryHandle,
        bridge: Rc<SelectionBridge>,
        notifier: Rc<dyn Notifier>,
    ) -> Result<Self> {
        let mut peers = Vec::new();
        let length = options.get_usize("length", 15);
        let extend = options.get_bool("extend-detection", true);

        for (key, value) in options.iter() {
            if let Some(name) = key.strip_prefix("user.") {
                let (host, port) = host_port(value)?;
                peers.push(Peer {
                    addr: PeerAddress {
                        name: name.to_string(),
                        host,
                        port,
                    },
                    history: DedupHistory::shared(length, extend),
                });
            }
        }

        let (tx, rx) = channel();
        Ok(ExchangeCoordinator {
            peers,
            tx,
            rx,
            current: RefCell::new(None),
            history,
            popup: Popup::new(bridge, PopupOptions::from_plugin(options)),
            notifier,
            truncation: options.truncation(),
            send_shortcut: options.get_or("shortcut", SEND_BINDING),
            accept_shortcut: options.get_or("accept-suggestion-shortcut", ACCEPT_BINDING),
            user_history_shortcut: options
                .get_or("user-history-shortcut", USER_HISTORY_BINDING),
        })
    }

    /// Channel endpoint handed to the transport worker thread. The worker
    /// only ever sends; all history mutation happens in `pump`.
    pub fn sender(&self) -> Sender<ExchangeEvent> {
        self.tx.clone()
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Drain pending events on the loop thread. Returns how many were
    /// applied.
    pub fn pump(&self) -> Result<usize> {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(ExchangeEvent::Suggest { peer, text }) => {
                    self.apply_suggestion(&peer, &text)?;
                    applied += 1;
                }
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Disconnected) => {
                    // Our own tx keeps the channel alive; unreachable in
                    // practice.
                    return Ok(applied);
                }
            }
        }
    }

    fn peer_index(&self, name: &str) -> Result<usize> {
        self.peers
            .iter()
            .position(|p| p.addr.name == name)
            .ok_or_else(|| anyhow!("Suggestion from unknown peer {:?}", name))
    }

    fn apply_suggestion(&self, peer: &str, text: &str) -> Result<()> {
        let index = self.peer_index(peer)?;
        let peer = &self.peers[index];

        peer.history.borrow_mut().add(text, true)?;
        *self.current.borrow_mut() = Some(index);

        self.notifier.notify(
            &format!("Suggestion from {}", peer.addr.name),
            &self.truncation.printable(text),
        );
        Ok(())
    }

    /// Accept the current suggestion into the main history and clipboard.
    pub fn accept_suggestion(&self) -> Result<()> {
        let index = match *self.current.borrow() {
            Some(index) => index,
            None => {
                self.notifier.notify("Klemmbrett", "No pending suggestion");
                return Ok(());
            }
        };

        let text = match self.peers[index].history.borrow().top() {
            Ok(text) => text.to_string(),
            Err(_) => {
                self.notifier.notify("Klemmbrett", "The history is empty");
                return Ok(());
            }
        };

        self.history.borrow_mut().add(&text, true)?;
        self.popup.set(Some(text))
    }

    /// One leaf per peer: activating it sends the main history's top entry
    /// to that peer through the transport sink.
    pub fn destination_items(&self, sink: Rc<dyn SuggestSink>) -> Vec<Item> {
        self.peers
            .iter()
            .map(|peer| {
                let history = self.history.clone();
                let notifier = self.notifier.clone();
                let sink = sink.clone();
                let addr = peer.addr.clone();

                Item::new(
                    addr.name.clone(),
                    Producer::value(move || {
                        let text = match history.borrow().top() {
                            Ok(text) => text.to_string(),
                            Err(_) => {
                                notifier.notify("Klemmbrett", "The history is empty");
                                return None;
                            }
                        };
                        if let Err(e) = sink.suggest(&addr, &text) {
                            log::error!("Failed to send suggestion to {}: {}", addr.name, e);
                            notifier
                                .notify("Klemmbrett", &format!("Sending to {} failed", addr.name));
                        }
                        None
                    }),
                )
            })
            .collect()
    }

    /// One lazy submenu per peer over that peer's history.
    pub fn user_history_items(&self) -> Vec<Item> {
        self.peers
            .iter()
            .map(|peer| {
                let history = peer.history.clone();
                let truncation = self.truncation;
                Item::new(
                    peer.addr.name.clone(),
                    Producer::submenu(move || {
                        history
                            .borrow()
                            .items(&truncation)
                            .map(|(label, raw)| Item::new(label, Producer::fixed(raw)))
                            .collect()
                    }),
                )
            })
            .collect()
    }

    pub fn popup(&self) -> &Popup {
        &self.popup
    }

    /// Open the destinations popup.
    pub fn open_destinations(&self, sink: Rc<dyn SuggestSink>) -> Vec<MenuEntry> {
        let top = self.history.borrow().top().ok().map(str::to_string);
        self.popup.open(self.destination_items(sink), top.as_deref())
    }

    /// Open the per-peer history popup.
    pub fn open_user_histories(&self) -> Vec<MenuEntry> {
        let top = self.history.borrow().top().ok().map(str::to_string);
        self.popup.open(self.user_history_items(), top.as_deref())
    }

    /// Register the three global triggers. Runs after construction of all
    /// components.
    pub fn bootstrap(
        self: &Rc<Self>,
        hotkeys: &dyn HotkeyBinder,
        sink: Rc<dyn SuggestSink>,
    ) {
        let this = self.clone();
        hotkeys.bind(&self.accept_shortcut, Box::new(move || {
            if let Err(e) = this.accept_suggestion() {
                log::error!("Failed to accept suggestion: {}", e);
            }
        }));

        let this = self.clone();
        hotkeys.bind(&self.user_history_shortcut, Box::new(move || {
            this.open_user_histories();
        }));

        let this = self.clone();
        let sink = sink.clone();
        hotkeys.bind(&self.send_shortcut, Box::new(move || {
            this.open_destinations(sink.clone());
        }));
    }
}
