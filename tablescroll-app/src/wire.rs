use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tablescroll_config::TablescrollConfig;
use tablescroll_core::{
    CalibrationSet, Extractor, HumanScroller, MergeReport, ObservationFrame, PointerGlide,
    RunSummary, ScrollOutcome, ScrollRequest, ScrollSession, StopOracle, StopVerdict, StoreRef,
};
use tablescroll_drivers::browser::driver::{DriverOptions, TableDriver};
use tablescroll_drivers::browser::page::TablePage;
use tablescroll_vision::traits::VisionClient;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct ExtractReport {
    pub store_path: PathBuf,
    #[serde(flatten)]
    pub merge: MergeReport,
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub provider: &'static str,
    pub model: String,
    pub healthy: bool,
}

/// Builds the session pieces from configuration for each CLI command.
pub struct Wiring {
    cfg: TablescrollConfig,
}

impl Wiring {
    pub fn new(cfg: TablescrollConfig) -> Self {
        Self { cfg }
    }

    fn vision(&self) -> Result<Arc<dyn VisionClient>> {
        Ok(tablescroll_vision::connect(&self.cfg.vision)?)
    }

    fn oracle(&self, client: Arc<dyn VisionClient>) -> Result<StopOracle> {
        let settings = self.cfg.oracle.clone();
        let calibration = match &settings.calibration_dir {
            Some(dir) => CalibrationSet::load(dir, settings.max_exemplars)?,
            None => {
                info!("calibration.none_configured");
                CalibrationSet::empty()
            }
        };
        Ok(StopOracle::new(client, Arc::new(calibration), settings))
    }

    fn extractor(&self, client: Arc<dyn VisionClient>) -> Extractor {
        Extractor::new(client, self.cfg.extraction.clone())
    }

    fn scroller(&self) -> HumanScroller {
        HumanScroller::human(Duration::from_millis(self.cfg.scroll.settle_timeout_ms))
    }

    async fn open_surface(&self) -> Result<(TableDriver, Arc<TablePage>)> {
        let browser = &self.cfg.browser;
        let driver = TableDriver::connect(&DriverOptions {
            webdriver_url: browser.webdriver_url.clone(),
            headless: browser.headless,
            stealth: browser.stealth,
        })
        .await?;
        let page = driver.open(browser.start_url.as_deref()).await?;
        Ok((driver, Arc::new(page)))
    }

    async fn close(driver: TableDriver) {
        if let Err(e) = driver.close().await {
            warn!(error = %e, "browser.close_failed");
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        // Vision and calibration problems are configuration errors; report
        // them before a browser is launched.
        let client = self.vision()?;
        let oracle = self.oracle(client.clone())?;
        let extractor = self.extractor(client);
        let store_path = StoreRef::from_settings(&self.cfg.store).resolve();

        let (driver, page) = self.open_surface().await?;
        let mut session = ScrollSession::new(page.clone(), oracle, extractor, self.scroller(), store_path)
            .with_settings(&self.cfg.session)
            .with_archive_dir(self.cfg.store.archive_dir.clone());
        if let Some(anchor) = self.cfg.scroll.anchor {
            session = session.with_glide(PointerGlide {
                from: page.pointer().unwrap_or_default(),
                to: anchor,
                steps: self.cfg.scroll.glide_steps,
            });
        }

        let cancel = session.cancellation_token();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("session.ctrl_c");
                cancel.cancel();
            }
        });
        let summary = session.run().await;
        watcher.abort();

        Self::close(driver).await;
        Ok(summary?)
    }

    pub async fn scroll(&self, request: ScrollRequest) -> Result<ScrollOutcome> {
        let (driver, page) = self.open_surface().await?;
        let outcome = self.scroller().perform(page.as_ref(), request).await;
        Self::close(driver).await;
        Ok(outcome?)
    }

    pub async fn check(&self) -> Result<StopVerdict> {
        let oracle = self.oracle(self.vision()?)?;
        let (driver, page) = self.open_surface().await?;
        let verdict = async {
            let frame = ObservationFrame::capture(page.as_ref()).await?;
            self.archive(&frame);
            oracle.evaluate(&frame).await
        }
        .await;
        Self::close(driver).await;
        Ok(verdict?)
    }

    pub async fn extract(&self) -> Result<ExtractReport> {
        let extractor = self.extractor(self.vision()?);
        let store_path = StoreRef::from_settings(&self.cfg.store).resolve();
        let (driver, page) = self.open_surface().await?;
        let merge = async {
            let frame = ObservationFrame::capture(page.as_ref()).await?;
            self.archive(&frame);
            extractor.extract_and_merge(&frame, &store_path).await
        }
        .await;
        Self::close(driver).await;
        Ok(ExtractReport {
            store_path,
            merge: merge?,
        })
    }

    pub async fn probe(&self) -> Result<ProbeReport> {
        let client = self.vision()?;
        let healthy = client.health_check().await?;
        Ok(ProbeReport {
            provider: self.cfg.vision.provider(),
            model: client.model_name().to_string(),
            healthy,
        })
    }

    fn archive(&self, frame: &ObservationFrame) {
        if let Some(dir) = &self.cfg.store.archive_dir {
            frame.archive(dir);
        }
    }
}
