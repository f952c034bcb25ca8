//! Render worker - runs in separate thread(s)

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::backend::RenderBackend;
use super::error::RenderFailure;
use super::request::{RenderRequest, RenderResponse};

/// Pull render requests off the shared queue until shutdown or until the
/// session side of either channel goes away.
pub fn render_worker(
    backend: Arc<dyn RenderBackend>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
) {
    for request in requests {
        match request {
            RenderRequest::Page {
                id,
                generation,
                tier,
                document,
                page,
                params,
            } => {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    backend.render(&document, page, &params)
                }))
                .unwrap_or_else(|_| Err(RenderFailure::new(page, "render backend panicked")));

                let response = match outcome {
                    Ok(data) => {
                        debug!(
                            "Rendered page {page} ({tier:?}) in {:?}",
                            started.elapsed()
                        );
                        RenderResponse::Page {
                            id,
                            generation,
                            page,
                            data,
                        }
                    }
                    Err(error) => {
                        warn!("Render of page {page} ({tier:?}) failed: {error}");
                        RenderResponse::Error {
                            id,
                            generation,
                            error,
                        }
                    }
                };

                if responses.send(response).is_err() {
                    break;
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flip::backend::{DocumentHandle, SyntheticBackend};
    use crate::flip::request::{Generation, RenderParams, RequestId};
    use crate::flip::scheduler::Tier;
    use crate::flip::types::Bitmap;

    const PARAMS: RenderParams = RenderParams {
        scale: 1.0,
        quality: 0.8,
    };

    struct PanickingBackend;

    impl RenderBackend for PanickingBackend {
        fn open(&self, _: &DocumentHandle) -> Result<usize, crate::flip::LoadFailure> {
            Ok(1)
        }

        fn render(&self, _: &DocumentHandle, _: usize, _: &RenderParams) -> Result<Bitmap, RenderFailure> {
            panic!("boom");
        }
    }

    fn page_request(id: u64, page: usize, document: &DocumentHandle) -> RenderRequest {
        RenderRequest::Page {
            id: RequestId::new(id),
            generation: Generation(3),
            tier: Tier::Visible,
            document: document.clone(),
            page,
            params: PARAMS,
        }
    }

    #[test]
    fn worker_renders_until_shutdown() {
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();
        let doc = SyntheticBackend::document(2);

        req_tx.send(page_request(1, 1, &doc)).unwrap();
        req_tx.send(page_request(2, 9, &doc)).unwrap();
        req_tx.send(RenderRequest::Shutdown).unwrap();
        render_worker(Arc::new(SyntheticBackend), req_rx, resp_tx);

        let responses: Vec<_> = resp_rx.drain().collect();
        assert_eq!(responses.len(), 2);
        assert!(matches!(
            &responses[0],
            RenderResponse::Page { page: 1, generation: Generation(3), .. }
        ));
        assert!(matches!(
            &responses[1],
            RenderResponse::Error { error, .. } if error.page == 9
        ));
    }

    #[test]
    fn backend_panic_becomes_render_failure() {
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();
        let doc = SyntheticBackend::document(1);

        req_tx.send(page_request(1, 1, &doc)).unwrap();
        drop(req_tx);
        render_worker(Arc::new(PanickingBackend), req_rx, resp_tx);

        let response = resp_rx.recv().unwrap();
        assert_eq!(response.page(), 1);
        assert!(matches!(response, RenderResponse::Error { .. }));
    }
}
