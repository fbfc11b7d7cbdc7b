//! Request dispatch from the wire protocol into the engine.

use std::sync::Arc;

use tracing::trace;

use surge_protocol::message::{GetReply, Request, Response};
use surge_protocol::server::RequestHandler;
use surge_txn::KvService;

/// The four RPC entry points of one server, backed by its `KvService`.
pub struct RpcSurface {
    service: Arc<KvService>,
}

impl RpcSurface {
    pub fn new(service: Arc<KvService>) -> Self {
        Self { service }
    }
}

impl RequestHandler for RpcSurface {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::Get { key, txid, client_id } => {
                trace!(%client_id, %txid, key, "Get");
                match self.service.get(&key, txid) {
                    Ok(outcome) => Response::Get(Ok(GetReply {
                        value: outcome.value,
                        present: outcome.present,
                    })),
                    Err(reason) => Response::Get(Err(reason)),
                }
            }
            Request::Put {
                key,
                value,
                txid,
                client_id,
            } => {
                trace!(%client_id, %txid, key, "Put");
                match self.service.put(&key, &value, txid) {
                    Ok(()) => Response::Put(Ok(())),
                    Err(reason) => Response::Put(Err(reason)),
                }
            }
            Request::Commit { txid, lead } => {
                trace!(%txid, lead, "Commit");
                self.service.commit(txid, lead);
                Response::Commit
            }
            Request::Abort { txid } => {
                trace!(%txid, "Abort");
                self.service.abort(txid);
                Response::Abort
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_common::{ClientId, ConflictReason, TxnId};

    fn surface() -> RpcSurface {
        RpcSurface::new(Arc::new(KvService::new()))
    }

    fn get(key: &str, txid: u64) -> Request {
        Request::Get {
            key: key.into(),
            txid: TxnId(txid),
            client_id: ClientId(0),
        }
    }

    fn put(key: &str, value: &str, txid: u64) -> Request {
        Request::Put {
            key: key.into(),
            value: value.into(),
            txid: TxnId(txid),
            client_id: ClientId(0),
        }
    }

    #[test]
    fn test_dispatch_round_trip() {
        let surface = surface();

        assert_eq!(surface.handle(put("k", "v", 1)), Response::Put(Ok(())));
        assert_eq!(
            surface.handle(Request::Commit {
                txid: TxnId(1),
                lead: true
            }),
            Response::Commit
        );

        match surface.handle(get("k", 2)) {
            Response::Get(Ok(reply)) => {
                assert_eq!(reply.value, "v");
                assert!(reply.present);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_surfaces_conflicts() {
        let surface = surface();

        assert_eq!(surface.handle(put("k", "a", 1)), Response::Put(Ok(())));
        assert_eq!(
            surface.handle(put("k", "b", 2)),
            Response::Put(Err(ConflictReason::WriteLocked))
        );
        assert_eq!(
            surface.handle(get("k", 3)),
            Response::Get(Err(ConflictReason::WriteLocked))
        );
    }
}
