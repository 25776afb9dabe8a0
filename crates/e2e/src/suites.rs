//! Suites written in Rust

use async_trait::async_trait;
use std::time::Duration;

use crate::error::E2eResult;
use crate::lifecycle::{Suite, TestCase, TestContext};
use crate::session::BrowserSession;
use crate::wait::{until_displayed, until_text_is};
use crate::{ensure, ensure_eq};

/// Names accepted by [`builtin`]
pub const BUILTIN_SUITES: &[&str] = &["subpath"];

pub fn builtin<S: BrowserSession>(name: &str) -> Option<Suite<S>> {
    match name {
        "subpath" => Some(subpath()),
        _ => None,
    }
}

/// OliveTin served from `/subpath`
pub fn subpath<S: BrowserSession>() -> Suite<S> {
    Suite::new("config: subpath", "subpath")
        .with_test(PageTitle)
        .with_test(StartDirPopupAction)
}

struct PageTitle;

#[async_trait]
impl<S: BrowserSession> TestCase<S> for PageTitle {
    fn title(&self) -> &str {
        "Page title"
    }

    async fn run(&self, ctx: &TestContext<'_, S>) -> E2eResult<()> {
        ensure!(
            ctx.base_url.ends_with("/subpath"),
            "base URL {} is not under /subpath",
            ctx.base_url
        );

        ctx.navigate("/").await?;

        let title = ctx.session.title().await?;
        ensure_eq!(title, "OliveTin");
        Ok(())
    }
}

struct StartDirPopupAction;

#[async_trait]
impl<S: BrowserSession> TestCase<S> for StartDirPopupAction {
    fn title(&self) -> &str {
        "Start dir action (popup)"
    }

    async fn run(&self, ctx: &TestContext<'_, S>) -> E2eResult<()> {
        let locators = ctx.locators();
        locators.root_and_wait().await?;

        let buttons = locators.action_buttons("dir-popup").await?;
        ensure_eq!(buttons.len(), 1);

        ctx.session.click(&buttons[0]).await?;

        let dialog = locators.results_dialog().await?;
        until_displayed(ctx.session, &dialog, true, ctx.wait).await?;

        let title = locators.dialog_title().await?;
        until_text_is(
            ctx.session,
            &title,
            "dir-popup",
            &ctx.wait.with_timeout(Duration::from_secs(2)),
        )
        .await?;

        let error = locators.error_region().await?;
        ensure!(
            !ctx.session.is_displayed(&error).await?,
            "error region is displayed after running dir-popup"
        );
        Ok(())
    }
}
