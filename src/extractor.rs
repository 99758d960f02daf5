use log::{debug, info, warn};
use scraper::{ElementRef, Html};

use crate::browser::{self, Session};
use crate::config::{SettleDelays, SiteSelectors, Timeouts};
use crate::delay_manager::{self, SettlePoint};
use crate::error::{BrowserError, ExtractError};
use crate::input_loader::RegistrationNumber;
use crate::ledger::{OutputLedger, SnapshotKind, SnapshotWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub registration: RegistrationNumber,
    pub cells: Vec<String>,
}

impl StatusRow {
    pub fn new(registration: RegistrationNumber, cells: Vec<String>) -> Self {
        StatusRow { registration, cells }
    }

    /// Ledger line: registration first, then the cells in column order.
    pub fn to_record(&self) -> Vec<&str> {
        std::iter::once(self.registration.as_str())
            .chain(self.cells.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStrategy {
    ById,
    AfterHeading,
    FirstOnPage,
}

impl TableStrategy {
    pub const ORDER: [TableStrategy; 3] = [
        TableStrategy::ById,
        TableStrategy::AfterHeading,
        TableStrategy::FirstOnPage,
    ];

    fn locate<'a>(self, doc: &'a Html, selectors: &SiteSelectors) -> Option<ElementRef<'a>> {
        match self {
            TableStrategy::ById => table_by_id(doc, &selectors.table_id),
            TableStrategy::AfterHeading => table_after_heading(doc, &selectors.status_heading),
            TableStrategy::FirstOnPage => elements(doc).find(|el| is_tag(el, "table")),
        }
    }

    fn wait(self, timeouts: &Timeouts) -> std::time::Duration {
        match self {
            TableStrategy::FirstOnPage => std::time::Duration::ZERO,
            _ => timeouts.table(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    /// All `<tr>` elements, including header and cell-less rows.
    pub total_rows: usize,
}

/// Result of extracting one registration. Never an `Err`: failures are
/// reported here after a snapshot has been taken.
#[derive(Debug)]
pub enum Extraction {
    Extracted { strategy: TableStrategy, rows_written: usize },
    Failed(ExtractError),
}

pub struct RecordExtractor<'a> {
    selectors: &'a SiteSelectors,
    timeouts: &'a Timeouts,
    settle: &'a SettleDelays,
    snapshots: &'a SnapshotWriter,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(
        selectors: &'a SiteSelectors,
        timeouts: &'a Timeouts,
        settle: &'a SettleDelays,
        snapshots: &'a SnapshotWriter,
    ) -> Self {
        RecordExtractor { selectors, timeouts, settle, snapshots }
    }

    /// Locate the status table on the focused page and append each data row
    /// to `ledger` as it is parsed.
    pub fn extract<S: Session + ?Sized>(
        &self,
        session: &S,
        registration: &RegistrationNumber,
        ledger: &mut OutputLedger,
    ) -> Extraction {
        delay_manager::settle(self.settle, SettlePoint::BeforeExtract);
        info!("Looking for construction status table...");

        let result = self
            .find_table(session)
            .map_err(ExtractError::from)
            .and_then(|found| found.ok_or(ExtractError::NoTableFound))
            .and_then(|(strategy, table)| {
                self.write_rows(registration, &table, ledger)
                    .map(|rows_written| (strategy, rows_written))
            });

        match result {
            Ok((strategy, rows_written)) => {
                info!("Successfully extracted and wrote {} rows of data for {}", rows_written, registration);
                Extraction::Extracted { strategy, rows_written }
            }
            Err(e) => {
                warn!("Error extracting construction status for {}: {}", registration, e);
                let kind = match e {
                    ExtractError::NoTableFound => SnapshotKind::NoTable,
                    _ => SnapshotKind::Error,
                };
                self.snapshots.capture(session, kind, registration);
                Extraction::Failed(e)
            }
        }
    }

    fn find_table<S: Session + ?Sized>(
        &self,
        session: &S,
    ) -> Result<Option<(TableStrategy, ParsedTable)>, BrowserError> {
        for strategy in TableStrategy::ORDER {
            let found = browser::poll_until(strategy.wait(self.timeouts), self.timeouts.poll_interval(), || {
                let html = session.page_source()?;
                Ok(locate_table(&html, self.selectors, &[strategy]))
            })?;

            match found {
                Some((_, table)) => {
                    info!("Found construction status table via {:?}", strategy);
                    return Ok(Some((strategy, table)));
                }
                None => debug!("Table strategy {:?} found nothing", strategy),
            }
        }
        Ok(None)
    }

    fn write_rows(
        &self,
        registration: &RegistrationNumber,
        table: &ParsedTable,
        ledger: &mut OutputLedger,
    ) -> Result<usize, ExtractError> {
        info!("Found {} rows in the construction status table", table.total_rows);
        match &table.header {
            Some(header) => info!("Table headers: {:?}", header),
            None => info!("No header row found, processing all rows"),
        }
        if table.rows.is_empty() {
            warn!("Table for {} has no data rows", registration);
        }

        let mut written = 0;
        for cells in &table.rows {
            ledger.append(&StatusRow::new(registration.clone(), cells.clone()))?;
            written += 1;
        }
        Ok(written)
    }
}

/// First of `strategies` that finds a table on `html`, with the table parsed.
pub fn locate_table(
    html: &str,
    selectors: &SiteSelectors,
    strategies: &[TableStrategy],
) -> Option<(TableStrategy, ParsedTable)> {
    let doc = Html::parse_document(html);
    strategies
        .iter()
        .find_map(|&strategy| strategy.locate(&doc, selectors).map(|t| (strategy, parse_table(t))))
}

/// First row is a header only if it carries `<th>` cells. A row yields data
/// only if it has at least one `<td>`.
pub fn parse_table(table: ElementRef<'_>) -> ParsedTable {
    let rows: Vec<ElementRef<'_>> = descendants(table).filter(|el| is_tag(el, "tr")).collect();

    let header = rows.first().and_then(|first| {
        let cells: Vec<String> = child_cells(*first, "th").map(cell_text).collect();
        (!cells.is_empty()).then_some(cells)
    });
    let start = usize::from(header.is_some());

    let data = rows
        .iter()
        .skip(start)
        .map(|row| child_cells(*row, "td").map(cell_text).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect();

    ParsedTable { header, rows: data, total_rows: rows.len() }
}

fn elements(doc: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    descendants(doc.root_element())
}

fn descendants(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    el.descendants().skip(1).filter_map(ElementRef::wrap)
}

fn child_cells<'a>(row: ElementRef<'a>, tag: &'static str) -> impl Iterator<Item = ElementRef<'a>> {
    row.children().filter_map(ElementRef::wrap).filter(move |el| is_tag(el, tag))
}

fn is_tag(el: &ElementRef<'_>, tag: &str) -> bool {
    el.value().name().eq_ignore_ascii_case(tag)
}

fn is_heading(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn table_by_id<'a>(doc: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    elements(doc).find(|el| is_tag(el, "table") && el.value().id() == Some(id))
}

/// First table after (in document order) a heading whose text contains
/// `heading`, compared case-insensitively.
fn table_after_heading<'a>(doc: &'a Html, heading: &str) -> Option<ElementRef<'a>> {
    let needle = heading.to_lowercase();
    let mut heading_seen = false;
    for el in elements(doc) {
        if !heading_seen {
            heading_seen = is_heading(&el) && cell_text(el).to_lowercase().contains(&needle);
        } else if is_tag(&el, "table") {
            return Some(el);
        }
    }
    None
}
