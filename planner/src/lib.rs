//! Weekly planner library: markdown schedule import and week-grid projection.
//! The parser and projection modules are pure; persistence is only reached through
//! the `storage::ScheduleStore` handle a caller passes in.

pub mod model {
    use chrono::{DateTime, Datelike, NaiveDate, Utc};
    use serde::{Deserialize, Serialize};
    use serde_with::skip_serializing_none;
    use std::{collections::BTreeSet, fmt};
    use uuid::Uuid;

    /* ------------------------------- IDs ------------------------------- */

    /// Identifier assigned by the store when a record is appended.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RecordId(pub Uuid);

    impl RecordId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for RecordId {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Display for RecordId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.fmt(f)
        }
    }

    /// Opaque identity of the signed-in user; every read and write is scoped by it.
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct UserId(pub String);

    impl UserId {
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl From<&str> for UserId {
        fn from(s: &str) -> Self {
            Self(s.to_string())
        }
    }

    impl fmt::Display for UserId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /* ------------------------------ Weekdays ------------------------------ */

    /// Weekday index, 0 = Sunday .. 6 = Saturday.
    pub type WeekdayIndex = u8;

    pub const WEEKDAY_SHORT_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

    /// Days assigned to every block read from the rhythm table (Mon..Thu).
    pub const IMPORTED_BLOCK_DAYS: [WeekdayIndex; 4] = [1, 2, 3, 4];

    pub fn weekday_index(date: NaiveDate) -> WeekdayIndex {
        date.weekday().num_days_from_sunday() as WeekdayIndex
    }

    /* ---------------------------- Value Objects ---------------------------- */

    /// Presentation tag for blocks, focus labels and events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Color {
        Blue,
        Slate,
        Indigo,
        Purple,
        Yellow,
        Orange,
        Emerald,
        Default,
    }

    impl Color {
        pub fn as_str(&self) -> &'static str {
            match self {
                Color::Blue => "blue",
                Color::Slate => "slate",
                Color::Indigo => "indigo",
                Color::Purple => "purple",
                Color::Yellow => "yellow",
                Color::Orange => "orange",
                Color::Emerald => "emerald",
                Color::Default => "default",
            }
        }
    }

    impl fmt::Display for Color {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum BlockKind {
        Block,
        Break,
    }

    /// Discriminator of a persisted schedule record (`type` on the wire).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum EntityKind {
        Block,
        Break,
        Focus,
        Event,
    }

    impl From<BlockKind> for EntityKind {
        fn from(kind: BlockKind) -> Self {
            match kind {
                BlockKind::Block => EntityKind::Block,
                BlockKind::Break => EntityKind::Break,
            }
        }
    }

    impl fmt::Display for EntityKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = match self {
                EntityKind::Block => "block",
                EntityKind::Break => "break",
                EntityKind::Focus => "focus",
                EntityKind::Event => "event",
            };
            f.write_str(s)
        }
    }

    /* --------------------------- Parsed document --------------------------- */

    /// Recurring time block read from the `| Block | Time | What |` table.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ScheduleBlock {
        pub title: String,
        #[serde(rename = "type")]
        pub kind: BlockKind,
        /// `HH:MM`, 24-hour.
        pub start_time: String,
        pub end_time: String,
        pub days: BTreeSet<WeekdayIndex>,
        pub color: Color,
    }

    /// Theme of a weekday, from a `## Day — Title` header or a `**Focus:**` line.
    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DailyFocus {
        pub day_index: WeekdayIndex,
        pub title: String,
        pub description: Option<String>,
        pub color: Color,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExtractedTask {
        pub text: String,
        pub completed: bool,
        pub day_index: WeekdayIndex,
    }

    /// Parser output; doubles as the import preview payload.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ParsedSchedule {
        pub blocks: Vec<ScheduleBlock>,
        pub daily_focus: Vec<DailyFocus>,
        pub tasks: Vec<ExtractedTask>,
    }

    impl ParsedSchedule {
        /// No blocks and no focus labels: nothing worth importing.
        pub fn has_schedule_data(&self) -> bool {
            !self.blocks.is_empty() || !self.daily_focus.is_empty()
        }
    }

    /* --------------------------- Persisted records --------------------------- */

    /// Stored schedule record: a recurring block, a focus label, or a dated event.
    ///
    /// `days` and `date` are mutually exclusive in practice; a record with neither
    /// never appears on the grid.
    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ScheduleEntity {
        pub id: RecordId,
        #[serde(rename = "type")]
        pub kind: EntityKind,
        pub days: Option<BTreeSet<WeekdayIndex>>,
        pub date: Option<NaiveDate>,
        pub start_time: String,
        pub end_time: String,
        pub title: String,
        pub description: Option<String>,
        pub color: Color,
        pub created_at: DateTime<Utc>,
    }

    impl ScheduleEntity {
        /// Hour component of `start_time`; minutes are ignored.
        pub fn start_hour(&self) -> Option<u32> {
            hour_component(&self.start_time)
        }

        pub fn end_hour(&self) -> Option<u32> {
            hour_component(&self.end_time)
        }

        pub fn is_focus(&self) -> bool {
            self.kind == EntityKind::Focus
        }
    }

    fn hour_component(time: &str) -> Option<u32> {
        time.split(':').next()?.trim().parse().ok()
    }

    /// Fields of a schedule record before the store assigns `id` and `createdAt`.
    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ScheduleDraft {
        #[serde(rename = "type")]
        pub kind: EntityKind,
        pub days: Option<BTreeSet<WeekdayIndex>>,
        pub date: Option<NaiveDate>,
        pub start_time: String,
        pub end_time: String,
        pub title: String,
        pub description: Option<String>,
        pub color: Color,
    }

    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TaskRecord {
        pub id: RecordId,
        pub text: String,
        pub completed: bool,
        pub due_date: Option<NaiveDate>,
        pub created_at: DateTime<Utc>,
    }

    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TaskDraft {
        pub text: String,
        pub completed: bool,
        pub due_date: Option<NaiveDate>,
    }
}

pub mod parser {
    //! Best-effort reader for a weekly planning document.
    //!
    //! Two line-oriented passes:
    //! - the `| Block | Time | What |` table yields recurring blocks;
    //! - `## <weekday>` sections yield focus labels (`## Monday — Theme`, `**Focus:** ...`)
    //!   and unchecked checklist items (`- [ ] ...`). A `---` line closes a section.
    //!
    //! Nothing here fails: malformed rows and lines are dropped and parsing goes on.

    use crate::model::*;
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::{tag, tag_no_case, take_while_m_n},
        character::complete::{char, space0},
        combinator::{eof, map, map_res, opt, rest},
        error::VerboseError,
        sequence::{preceded, tuple},
    };

    const BLOCK_TABLE_HEADER: &str = "| Block | Time | What |";
    const DEFAULT_TIME: &str = "09:00";
    const SECTION_BREAK: &str = "---";
    const FOCUS_SEPARATORS: [char; 3] = ['—', '–', '-'];

    /// Searched in this order; the first key contained in a header wins.
    const WEEKDAY_KEYS: [(&str, WeekdayIndex); 14] = [
        ("sunday", 0),
        ("monday", 1),
        ("tuesday", 2),
        ("wednesday", 3),
        ("thursday", 4),
        ("friday", 5),
        ("saturday", 6),
        ("sun", 0),
        ("mon", 1),
        ("tue", 2),
        ("wed", 3),
        ("thu", 4),
        ("fri", 5),
        ("sat", 6),
    ];

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a planning document into blocks, daily focus labels and tasks.
    pub fn parse_schedule_markdown(markdown: &str) -> ParsedSchedule {
        let lines: Vec<&str> = markdown.lines().collect();
        let blocks = extract_blocks(&lines);
        let (daily_focus, tasks) = extract_day_sections(&lines);
        ParsedSchedule {
            blocks,
            daily_focus,
            tasks,
        }
    }

    /// `break` when the title mentions a break or lunch.
    pub fn classify_block_kind(title: &str) -> BlockKind {
        let lower = title.to_lowercase();
        if lower.contains("break") || lower.contains("lunch") {
            BlockKind::Break
        } else {
            BlockKind::Block
        }
    }

    pub fn classify_block_color(title: &str) -> Color {
        if title.to_lowercase().contains("wind down") {
            return Color::Indigo;
        }
        match classify_block_kind(title) {
            BlockKind::Break => Color::Slate,
            BlockKind::Block => Color::Blue,
        }
    }

    pub fn resolve_weekday(header: &str) -> Option<WeekdayIndex> {
        let lower = header.to_lowercase();
        WEEKDAY_KEYS
            .iter()
            .find(|(name, _)| lower.contains(name))
            .map(|(_, idx)| *idx)
    }

    pub fn focus_color(day: WeekdayIndex) -> Color {
        match day {
            1 => Color::Blue,
            2 => Color::Purple,
            3 => Color::Yellow,
            4 => Color::Orange,
            5 => Color::Emerald,
            _ => Color::Blue,
        }
    }

    /// Normalize a loosely written clock time to 24-hour `HH:MM`.
    ///
    /// A bare hour between 1 and 6 is read as afternoon ("2" means 2 PM in a
    /// working-day schedule). Minutes are kept as written. Trailing notes after a
    /// leading `H[:MM]` are ignored except for an am/pm marker ("3:30ish", "2 p.m.").
    pub fn normalize_time(raw: Option<&str>) -> String {
        let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
            return DEFAULT_TIME.to_string();
        };
        let lowered = text.to_lowercase();
        if let Ok((_, clock)) = clock_time(&lowered) {
            return clock.to_24h();
        }
        match hour_and_minutes(&lowered) {
            Ok((tail, (hour, minutes))) => ClockTime {
                hour,
                minutes,
                meridiem: loose_meridiem(tail),
            }
            .to_24h(),
            Err(_) => lowered
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == ':')
                .collect(),
        }
    }

    /* ---------------------------- Block table ---------------------------- */

    fn extract_blocks(lines: &[&str]) -> Vec<ScheduleBlock> {
        let Some(header) = lines.iter().position(|l| l.contains(BLOCK_TABLE_HEADER)) else {
            return Vec::new();
        };
        // Skip the header and the `|---|` separator row.
        lines
            .iter()
            .skip(header + 2)
            .take_while(|l| l.trim().starts_with('|'))
            .filter_map(|row| parse_block_row(row))
            .collect()
    }

    fn parse_block_row(row: &str) -> Option<ScheduleBlock> {
        let cells: Vec<&str> = row
            .split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        let [_name, range, title, ..] = cells.as_slice() else {
            return None;
        };
        let range = range.replace('–', "-");
        let mut bounds = range.split('-');
        let (start, end) = (bounds.next(), bounds.next());

        Some(ScheduleBlock {
            title: title.to_string(),
            kind: classify_block_kind(title),
            start_time: normalize_time(start),
            end_time: normalize_time(end),
            days: IMPORTED_BLOCK_DAYS.into_iter().collect(),
            color: classify_block_color(title),
        })
    }

    /* ---------------------------- Day sections ---------------------------- */

    fn extract_day_sections(lines: &[&str]) -> (Vec<DailyFocus>, Vec<ExtractedTask>) {
        let mut focus: Vec<DailyFocus> = Vec::new();
        let mut tasks: Vec<ExtractedTask> = Vec::new();
        let mut current_day: Option<WeekdayIndex> = None;

        for line in lines {
            if let Some(header) = line.strip_prefix("## ") {
                if let Some(day) = resolve_weekday(header) {
                    current_day = Some(day);
                    if let Some(title) = header_focus_title(header) {
                        if !focus.iter().any(|f| f.day_index == day) {
                            focus.push(DailyFocus {
                                day_index: day,
                                title,
                                description: None,
                                color: focus_color(day),
                            });
                        }
                    }
                }
                continue;
            }

            let Some(day) = current_day else {
                continue;
            };

            if let Some(text) = focus_line(line) {
                match focus.iter_mut().find(|f| f.day_index == day) {
                    Some(existing) => existing.description = Some(text.to_string()),
                    None => focus.push(DailyFocus {
                        day_index: day,
                        title: text.to_string(),
                        description: None,
                        color: focus_color(day),
                    }),
                }
            } else if let Some(text) = task_line(line) {
                tasks.push(ExtractedTask {
                    text,
                    completed: false,
                    day_index: day,
                });
            } else if line.trim() == SECTION_BREAK {
                current_day = None;
            }
        }

        (focus, tasks)
    }

    /// Text after the first dash in a day header, e.g. "Setup & Learn".
    fn header_focus_title(header: &str) -> Option<String> {
        let (_, title) = header.split_once(FOCUS_SEPARATORS)?;
        let title = title.trim();
        (!title.is_empty()).then(|| title.to_string())
    }

    fn focus_line(line: &str) -> Option<&str> {
        let parsed: PResult<'_, &str> =
            preceded(tuple((space0, tag_no_case("**focus:**"))), rest)(line);
        let (_, text) = parsed.ok()?;
        let text = text.trim();
        Some(text.strip_prefix("Focus:").unwrap_or(text).trim())
    }

    fn task_line(line: &str) -> Option<String> {
        let parsed: PResult<'_, &str> = preceded(tuple((space0, tag("- [ ]"))), rest)(line);
        let (_, text) = parsed.ok()?;
        Some(text.replace("**", "").trim().to_string())
    }

    /* ----------------------------- Clock times ----------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Meridiem {
        Am,
        Pm,
    }

    #[derive(Debug)]
    struct ClockTime<'a> {
        hour: u32,
        minutes: Option<&'a str>,
        meridiem: Option<Meridiem>,
    }

    impl ClockTime<'_> {
        fn to_24h(&self) -> String {
            let hour = match self.meridiem {
                Some(Meridiem::Pm) if self.hour != 12 => self.hour + 12,
                None if (1..=6).contains(&self.hour) => self.hour + 12,
                _ => self.hour,
            };
            format!("{:02}:{}", hour, self.minutes.unwrap_or("00"))
        }
    }

    /// Leading `H[:MM]`; whatever follows is left to the caller.
    fn hour_and_minutes(i: &str) -> PResult<'_, (u32, Option<&str>)> {
        let (i, hour) = map_res(take_while_m_n(1, 2, |c: char| c.is_ascii_digit()), |s: &str| {
            s.parse::<u32>()
        })(i)?;
        let (i, minutes) = opt(preceded(
            char(':'),
            take_while_m_n(1, 2, |c: char| c.is_ascii_digit()),
        ))(i)?;
        Ok((i, (hour, minutes)))
    }

    /// Marker anywhere in free text after the clock digits, dots ignored ("p.m.").
    fn loose_meridiem(tail: &str) -> Option<Meridiem> {
        let letters: String = tail.chars().filter(char::is_ascii_alphabetic).collect();
        if letters.starts_with("pm") {
            Some(Meridiem::Pm)
        } else if letters.starts_with("am") {
            Some(Meridiem::Am)
        } else {
            None
        }
    }

    fn clock_time(i: &str) -> PResult<'_, ClockTime<'_>> {
        let (i, (hour, minutes)) = hour_and_minutes(i)?;
        let (i, _) = space0(i)?;
        let (i, meridiem) = opt(alt((
            map(tag("am"), |_| Meridiem::Am),
            map(tag("pm"), |_| Meridiem::Pm),
        )))(i)?;
        let (i, _) = space0(i)?;
        let (i, _) = eof(i)?;
        Ok((
            i,
            ClockTime {
                hour,
                minutes,
                meridiem,
            },
        ))
    }

}

pub mod projection {
    //! Week-grid view model: which stored records land in which day/hour cell and
    //! where to draw them. Pure functions over plain data.

    use crate::model::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
    use serde::{Deserialize, Serialize};

    pub const DAYS_PER_WEEK: usize = 7;

    /* ------------------------------- Layout ------------------------------- */

    /// Vertical geometry of the hour grid; one row per hour.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct GridLayout {
        pub first_hour: u32,
        pub hour_count: u32,
        pub row_height: f32,
        /// Gap left under each placed record so neighbours don't touch.
        pub block_margin: f32,
    }

    impl Default for GridLayout {
        fn default() -> Self {
            Self {
                first_hour: 8,
                hour_count: 12,
                row_height: 80.0,
                block_margin: 4.0,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Placement {
        pub top: f32,
        pub height: f32,
    }

    impl GridLayout {
        pub fn display_hours(&self) -> std::ops::Range<u32> {
            self.first_hour..self.first_hour + self.hour_count
        }

        /// Offset and height from whole start/end hours. Not clamped to the visible range.
        pub fn place_hours(&self, start: u32, end: u32) -> Placement {
            let start = start as f32;
            let end = end as f32;
            let first = self.first_hour as f32;
            Placement {
                top: (start - first) * self.row_height,
                height: (end - start) * self.row_height - self.block_margin,
            }
        }

        pub fn place(&self, entity: &ScheduleEntity) -> Option<Placement> {
            Some(self.place_hours(entity.start_hour()?, entity.end_hour()?))
        }

        /// Continuous offset for a time of day (minutes included), for the "now" line.
        pub fn offset_at(&self, at: NaiveDateTime) -> f32 {
            let hours = at.hour() as f32 + at.minute() as f32 / 60.0;
            (hours - self.first_hour as f32) * self.row_height
        }
    }

    /* ------------------------------ Week window ------------------------------ */

    /// Seven Sunday-aligned dates around a pivot date.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WeekWindow {
        pub pivot: NaiveDate,
        pub start: NaiveDate,
    }

    impl WeekWindow {
        /// The week (Sunday first) containing `pivot`.
        pub fn containing(pivot: NaiveDate) -> Self {
            let back = Duration::days(i64::from(weekday_index(pivot)));
            Self {
                pivot,
                start: pivot - back,
            }
        }

        /// Move the pivot by whole weeks and re-align.
        pub fn shifted(&self, weeks: i32) -> Self {
            Self::containing(shift_pivot(self.pivot, weeks))
        }

        pub fn dates(&self) -> [NaiveDate; DAYS_PER_WEEK] {
            std::array::from_fn(|i| self.start + Duration::days(i as i64))
        }

        pub fn end(&self) -> NaiveDate {
            self.start + Duration::days(DAYS_PER_WEEK as i64 - 1)
        }

        pub fn contains(&self, date: NaiveDate) -> bool {
            date >= self.start && date <= self.end()
        }

        /// Concrete date of a weekday inside this window.
        pub fn date_for_weekday(&self, day: WeekdayIndex) -> Option<NaiveDate> {
            (usize::from(day) < DAYS_PER_WEEK).then(|| self.start + Duration::days(i64::from(day)))
        }

        /// e.g. "October 2026", taken from the pivot.
        pub fn month_label(&self) -> String {
            self.pivot.format("%B %Y").to_string()
        }
    }

    pub fn shift_pivot(pivot: NaiveDate, weeks: i32) -> NaiveDate {
        pivot + Duration::weeks(i64::from(weeks))
    }

    /* ------------------------------ Queries ------------------------------ */

    /// Recurs on the weekday of `date`, or is pinned to exactly `date`.
    pub fn occurs_on(entity: &ScheduleEntity, date: NaiveDate) -> bool {
        let recurring = entity
            .days
            .as_ref()
            .is_some_and(|days| days.contains(&weekday_index(date)));
        recurring || entity.date == Some(date)
    }

    /// Records that start in the `hour` row of `date`, in storage order.
    pub fn entities_for_slot(
        entities: &[ScheduleEntity],
        date: NaiveDate,
        hour: u32,
    ) -> Vec<&ScheduleEntity> {
        entities
            .iter()
            .filter(|e| occurs_on(e, date) && e.start_hour() == Some(hour))
            .collect()
    }

    /// First focus record for `date`; storage order decides between duplicates.
    pub fn focus_for_date(entities: &[ScheduleEntity], date: NaiveDate) -> Option<&ScheduleEntity> {
        entities.iter().find(|e| e.is_focus() && occurs_on(e, date))
    }

    /// "8AM", "12PM", "7PM".
    pub fn hour_label(hour: u32) -> String {
        let display = if hour > 12 { hour - 12 } else { hour };
        let suffix = if hour >= 12 { "PM" } else { "AM" };
        format!("{display}{suffix}")
    }

    /// Offset of the current-time line, only when `now` falls inside the window.
    pub fn now_indicator(window: &WeekWindow, now: NaiveDateTime, layout: &GridLayout) -> Option<f32> {
        window
            .contains(now.date())
            .then(|| layout.offset_at(now))
    }

    /* ------------------------------ Week grid ------------------------------ */

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WeekGrid {
        pub month_label: String,
        pub days: Vec<DayColumn>,
        /// Offset of the current-time line; `None` unless the window holds today.
        pub now_offset: Option<f32>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DayColumn {
        pub date: NaiveDate,
        pub weekday: String,
        pub is_today: bool,
        pub focus: Option<FocusLabel>,
        pub slots: Vec<SlotCell>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FocusLabel {
        pub title: String,
        pub description: Option<String>,
        pub color: Color,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SlotCell {
        pub hour: u32,
        pub label: String,
        pub entries: Vec<PlacedEntity>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlacedEntity {
        pub id: RecordId,
        pub kind: EntityKind,
        pub title: String,
        pub color: Color,
        pub start_time: String,
        pub end_time: String,
        pub placement: Placement,
    }

    /// Project stored records onto the window's seven columns and display hours.
    pub fn project_week(
        entities: &[ScheduleEntity],
        window: &WeekWindow,
        layout: &GridLayout,
        now: NaiveDateTime,
    ) -> WeekGrid {
        let today = now.date();
        let days = window
            .dates()
            .into_iter()
            .map(|date| DayColumn {
                date,
                weekday: WEEKDAY_SHORT_NAMES[usize::from(weekday_index(date))].to_string(),
                is_today: date == today,
                focus: focus_for_date(entities, date).map(|f| FocusLabel {
                    title: f.title.clone(),
                    description: f.description.clone(),
                    color: f.color,
                }),
                slots: layout
                    .display_hours()
                    .map(|hour| SlotCell {
                        hour,
                        label: hour_label(hour),
                        entries: entities_for_slot(entities, date, hour)
                            .into_iter()
                            .filter_map(|e| place_entity(e, layout))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        WeekGrid {
            month_label: window.month_label(),
            days,
            now_offset: now_indicator(window, now, layout),
        }
    }

    fn place_entity(entity: &ScheduleEntity, layout: &GridLayout) -> Option<PlacedEntity> {
        Some(PlacedEntity {
            id: entity.id,
            kind: entity.kind,
            title: entity.title.clone(),
            color: entity.color,
            start_time: entity.start_time.clone(),
            end_time: entity.end_time.clone(),
            placement: layout.place(entity)?,
        })
    }

}

pub mod storage {
    //! User-scoped document store seam plus two implementations: an in-process
    //! `MemoryStore` and a `JsonFileStore` that rewrites one JSON document per mutation.

    use crate::model::{RecordId, UserId};
    use chrono::{DateTime, Utc};
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize, de::DeserializeOwned};
    use serde_json::{Map, Value};
    use std::{
        collections::BTreeMap,
        fmt, fs,
        path::{Path, PathBuf},
    };
    use tracing::{debug, warn};

    pub const SCHEDULE_COLLECTION: &str = "schedule";
    pub const TASKS_COLLECTION: &str = "tasks";

    pub type Fields = Map<String, Value>;

    /// Callback receiving a full ordered snapshot on subscribe and after every change.
    pub type SnapshotCallback = Box<dyn FnMut(&[Document])>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubscriptionId(pub u64);

    /* ------------------------------ Documents ------------------------------ */

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Document {
        pub id: RecordId,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
        #[serde(default)]
        pub fields: Fields,
    }

    impl Document {
        /// Decode into a typed record; `id` and `createdAt` come from the envelope.
        pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
            let mut merged = self.fields.clone();
            merged.insert("id".into(), serde_json::to_value(self.id)?);
            merged.insert("createdAt".into(), serde_json::to_value(self.created_at)?);
            Ok(serde_json::from_value(Value::Object(merged))?)
        }
    }

    pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Rejected(format!(
                "expected an object of fields, got {other}"
            ))),
        }
    }

    /// Decode every document, skipping (and logging) those that don't fit `T`.
    pub fn decode_lenient<T: DeserializeOwned>(docs: &[Document]) -> Vec<T> {
        docs.iter()
            .filter_map(|doc| match doc.decode() {
                Ok(v) => Some(v),
                Err(err) => {
                    warn!(id = %doc.id, error = %err, "skipping undecodable document");
                    None
                }
            })
            .collect()
    }

    /* -------------------------------- Errors -------------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum StoreError {
        #[error("record {0} not found")]
        NotFound(RecordId),
        #[error("store rejected request: {0}")]
        Rejected(String),
        #[error("i/o error on {path:?}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("malformed store data")]
        Json(#[from] serde_json::Error),
    }

    /* --------------------------------- Seam --------------------------------- */

    /// What the importer and the week view need from the backing document store.
    pub trait ScheduleStore {
        /// Current contents of a collection, newest `createdAt` first.
        fn snapshot(&self, user: &UserId, collection: &str) -> Result<Vec<Document>, StoreError>;

        /// Deliver a snapshot now and after each change to the collection.
        fn subscribe(
            &mut self,
            user: &UserId,
            collection: &str,
            callback: SnapshotCallback,
        ) -> Result<SubscriptionId, StoreError>;

        fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

        /// Store assigns `id`, `createdAt` and `updatedAt`.
        fn append(
            &mut self,
            user: &UserId,
            collection: &str,
            fields: Fields,
        ) -> Result<Document, StoreError>;

        /// Merge `fields` over the stored ones.
        fn update(
            &mut self,
            user: &UserId,
            collection: &str,
            id: RecordId,
            fields: Fields,
        ) -> Result<Document, StoreError>;

        fn delete(&mut self, user: &UserId, collection: &str, id: RecordId) -> Result<(), StoreError>;
    }

    /* ------------------------------ Memory store ------------------------------ */

    /// user → collection → documents in insertion order.
    type StoreData = BTreeMap<String, BTreeMap<String, IndexMap<RecordId, Document>>>;

    struct Subscriber {
        id: SubscriptionId,
        user: UserId,
        collection: String,
        callback: SnapshotCallback,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        data: StoreData,
        subscribers: Vec<Subscriber>,
        next_subscription: u64,
    }

    impl fmt::Debug for MemoryStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MemoryStore")
                .field("users", &self.data.len())
                .field("subscribers", &self.subscribers.len())
                .finish()
        }
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn from_data(data: StoreData) -> Self {
            Self {
                data,
                ..Self::default()
            }
        }

        fn collection_mut(
            &mut self,
            user: &UserId,
            collection: &str,
        ) -> Result<&mut IndexMap<RecordId, Document>, StoreError> {
            check_user(user)?;
            Ok(self
                .data
                .entry(user.0.clone())
                .or_default()
                .entry(collection.to_string())
                .or_default())
        }

        // Mutations below change data only; callers notify once the change is kept.

        fn insert_document(
            &mut self,
            user: &UserId,
            collection: &str,
            fields: Fields,
        ) -> Result<Document, StoreError> {
            let now = Utc::now();
            let doc = Document {
                id: RecordId::new(),
                created_at: now,
                updated_at: now,
                fields,
            };
            self.collection_mut(user, collection)?
                .insert(doc.id, doc.clone());
            Ok(doc)
        }

        /// Returns the document before and after the merge.
        fn merge_document(
            &mut self,
            user: &UserId,
            collection: &str,
            id: RecordId,
            fields: Fields,
        ) -> Result<(Document, Document), StoreError> {
            let doc = self
                .collection_mut(user, collection)?
                .get_mut(&id)
                .ok_or(StoreError::NotFound(id))?;
            let previous = doc.clone();
            doc.fields.extend(fields);
            doc.updated_at = Utc::now();
            Ok((previous, doc.clone()))
        }

        /// Returns the removed document and the position it held.
        fn remove_document(
            &mut self,
            user: &UserId,
            collection: &str,
            id: RecordId,
        ) -> Result<(usize, Document), StoreError> {
            self.collection_mut(user, collection)?
                .shift_remove_full(&id)
                .map(|(index, _, doc)| (index, doc))
                .ok_or(StoreError::NotFound(id))
        }

        /// Put `doc` back at `index`, replacing any newer version with the same id.
        fn restore_document(
            &mut self,
            user: &UserId,
            collection: &str,
            index: usize,
            doc: Document,
        ) -> Result<(), StoreError> {
            let docs = self.collection_mut(user, collection)?;
            if docs.contains_key(&doc.id) {
                docs.insert(doc.id, doc);
            } else {
                docs.shift_insert(index.min(docs.len()), doc.id, doc);
            }
            Ok(())
        }

        fn notify(&mut self, user: &UserId, collection: &str) -> Result<(), StoreError> {
            if !self
                .subscribers
                .iter()
                .any(|s| &s.user == user && s.collection == collection)
            {
                return Ok(());
            }
            let snapshot = self.snapshot(user, collection)?;
            for sub in self
                .subscribers
                .iter_mut()
                .filter(|s| &s.user == user && s.collection == collection)
            {
                (sub.callback)(snapshot.as_slice());
            }
            Ok(())
        }
    }

    fn check_user(user: &UserId) -> Result<(), StoreError> {
        if user.0.trim().is_empty() {
            return Err(StoreError::Rejected("no signed-in user".into()));
        }
        Ok(())
    }

    impl ScheduleStore for MemoryStore {
        fn snapshot(&self, user: &UserId, collection: &str) -> Result<Vec<Document>, StoreError> {
            check_user(user)?;
            let mut docs: Vec<Document> = self
                .data
                .get(&user.0)
                .and_then(|c| c.get(collection))
                .map(|docs| docs.values().rev().cloned().collect())
                .unwrap_or_default();
            // Stable sort keeps later inserts first among equal timestamps.
            docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(docs)
        }

        fn subscribe(
            &mut self,
            user: &UserId,
            collection: &str,
            mut callback: SnapshotCallback,
        ) -> Result<SubscriptionId, StoreError> {
            let snapshot = self.snapshot(user, collection)?;
            callback(snapshot.as_slice());
            let id = SubscriptionId(self.next_subscription);
            self.next_subscription += 1;
            self.subscribers.push(Subscriber {
                id,
                user: user.clone(),
                collection: collection.to_string(),
                callback,
            });
            Ok(id)
        }

        fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
            let before = self.subscribers.len();
            self.subscribers.retain(|s| s.id != id);
            self.subscribers.len() != before
        }

        fn append(
            &mut self,
            user: &UserId,
            collection: &str,
            fields: Fields,
        ) -> Result<Document, StoreError> {
            let doc = self.insert_document(user, collection, fields)?;
            debug!(%user, collection, id = %doc.id, "appended document");
            self.notify(user, collection)?;
            Ok(doc)
        }

        fn update(
            &mut self,
            user: &UserId,
            collection: &str,
            id: RecordId,
            fields: Fields,
        ) -> Result<Document, StoreError> {
            let (_, updated) = self.merge_document(user, collection, id, fields)?;
            debug!(%user, collection, %id, "updated document");
            self.notify(user, collection)?;
            Ok(updated)
        }

        fn delete(&mut self, user: &UserId, collection: &str, id: RecordId) -> Result<(), StoreError> {
            self.remove_document(user, collection, id)?;
            debug!(%user, collection, %id, "deleted document");
            self.notify(user, collection)
        }
    }

    /* ------------------------------ JSON file store ------------------------------ */

    /// A `MemoryStore` persisted to a single JSON file after every mutation.
    ///
    /// A change is only kept in memory (and announced to subscribers) once the file
    /// write succeeds; a failed save undoes it.
    #[derive(Debug)]
    pub struct JsonFileStore {
        path: PathBuf,
        inner: MemoryStore,
    }

    impl JsonFileStore {
        /// Open `path`, starting empty when the file does not exist yet.
        pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
            let path = path.into();
            let data = if path.exists() {
                let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                if text.trim().is_empty() {
                    StoreData::new()
                } else {
                    serde_json::from_str(&text)?
                }
            } else {
                StoreData::new()
            };
            debug!(?path, users = data.len(), "opened json store");
            Ok(Self {
                path,
                inner: MemoryStore::from_data(data),
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn save(&self) -> Result<(), StoreError> {
            let text = serde_json::to_string_pretty(&self.inner.data)?;
            fs::write(&self.path, text.as_bytes()).map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
        }
    }

    impl ScheduleStore for JsonFileStore {
        fn snapshot(&self, user: &UserId, collection: &str) -> Result<Vec<Document>, StoreError> {
            self.inner.snapshot(user, collection)
        }

        fn subscribe(
            &mut self,
            user: &UserId,
            collection: &str,
            callback: SnapshotCallback,
        ) -> Result<SubscriptionId, StoreError> {
            self.inner.subscribe(user, collection, callback)
        }

        fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
            self.inner.unsubscribe(id)
        }

        fn append(
            &mut self,
            user: &UserId,
            collection: &str,
            fields: Fields,
        ) -> Result<Document, StoreError> {
            let doc = self.inner.insert_document(user, collection, fields)?;
            if let Err(err) = self.save() {
                self.inner.remove_document(user, collection, doc.id)?;
                return Err(err);
            }
            debug!(%user, collection, id = %doc.id, "appended document");
            self.inner.notify(user, collection)?;
            Ok(doc)
        }

        fn update(
            &mut self,
            user: &UserId,
            collection: &str,
            id: RecordId,
            fields: Fields,
        ) -> Result<Document, StoreError> {
            let (previous, updated) = self.inner.merge_document(user, collection, id, fields)?;
            if let Err(err) = self.save() {
                self.inner.restore_document(user, collection, 0, previous)?;
                return Err(err);
            }
            debug!(%user, collection, %id, "updated document");
            self.inner.notify(user, collection)?;
            Ok(updated)
        }

        fn delete(&mut self, user: &UserId, collection: &str, id: RecordId) -> Result<(), StoreError> {
            let (index, removed) = self.inner.remove_document(user, collection, id)?;
            if let Err(err) = self.save() {
                self.inner.restore_document(user, collection, index, removed)?;
                return Err(err);
            }
            debug!(%user, collection, %id, "deleted document");
            self.inner.notify(user, collection)
        }
    }

}

pub mod import {
    //! Caller-facing import flow: check the file, parse it into a preview, and on
    //! confirmation write each item as its own record.
    //!
    //! Writes are sequential and not atomic. The first failed write stops the batch;
    //! records written before it stay unless `rollback_on_failure` is set.

    use crate::model::*;
    use crate::parser::parse_schedule_markdown;
    use crate::projection::WeekWindow;
    use crate::storage::{
        Fields, SCHEDULE_COLLECTION, ScheduleStore, StoreError, TASKS_COLLECTION, to_fields,
    };
    use serde::{Deserialize, Serialize};
    use std::{fmt, path::Path};
    use tracing::{debug, error, info, warn};

    pub const MARKDOWN_EXTENSION: &str = "md";
    pub const FOCUS_START: &str = "00:00";
    pub const FOCUS_END: &str = "23:59";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RecordKind {
        Block,
        Focus,
        Task,
    }

    impl fmt::Display for RecordKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = match self {
                RecordKind::Block => "block",
                RecordKind::Focus => "focus",
                RecordKind::Task => "task",
            };
            f.write_str(s)
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub enum ImportError {
        #[error("please upload a valid Markdown (.md) file, got {name:?}")]
        InvalidFileType { name: String },
        #[error("failed to parse file: {0}")]
        Unreadable(#[from] std::str::Utf8Error),
        #[error("could not find any schedule data in this file; check the format")]
        NoScheduleData,
        #[error("import stopped at a {kind} record after {written} successful write(s)")]
        Persistence {
            kind: RecordKind,
            written: usize,
            #[source]
            source: StoreError,
        },
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct ImportOptions {
        /// Delete this batch's earlier records when a later write fails.
        pub rollback_on_failure: bool,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ImportCounts {
        pub blocks: usize,
        pub daily_focus: usize,
        pub tasks: usize,
    }

    impl ImportCounts {
        pub fn of(schedule: &ParsedSchedule) -> Self {
            Self {
                blocks: schedule.blocks.len(),
                daily_focus: schedule.daily_focus.len(),
                tasks: schedule.tasks.len(),
            }
        }

        pub fn total(&self) -> usize {
            self.blocks + self.daily_focus + self.tasks
        }
    }

    impl fmt::Display for ImportCounts {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{} recurring blocks, {} daily focuses, {} tasks",
                self.blocks, self.daily_focus, self.tasks
            )
        }
    }

    /// Parsed but not yet persisted; shown for confirmation.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ImportPreview {
        pub counts: ImportCounts,
        pub schedule: ParsedSchedule,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ImportSummary {
        pub counts: ImportCounts,
        pub record_ids: Vec<RecordId>,
    }

    /* ------------------------------- Preview ------------------------------- */

    /// Validate and parse an uploaded file.
    pub fn preview_import(file_name: &str, content: &[u8]) -> Result<ImportPreview, ImportError> {
        if !is_markdown_file(file_name) {
            return Err(ImportError::InvalidFileType {
                name: file_name.to_string(),
            });
        }
        let text = std::str::from_utf8(content)?;
        preview_text(text)
    }

    pub fn preview_text(text: &str) -> Result<ImportPreview, ImportError> {
        let schedule = parse_schedule_markdown(text);
        if !schedule.has_schedule_data() {
            return Err(ImportError::NoScheduleData);
        }
        let counts = ImportCounts::of(&schedule);
        debug!(%counts, "parsed schedule preview");
        Ok(ImportPreview { counts, schedule })
    }

    pub fn is_markdown_file(file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext == MARKDOWN_EXTENSION)
    }

    /* ------------------------------- Records ------------------------------- */

    pub fn block_draft(block: &ScheduleBlock) -> ScheduleDraft {
        ScheduleDraft {
            kind: block.kind.into(),
            days: Some(block.days.clone()),
            date: None,
            start_time: block.start_time.clone(),
            end_time: block.end_time.clone(),
            title: block.title.clone(),
            description: None,
            color: block.color,
        }
    }

    /// A focus label recurs weekly on its day and spans the whole day.
    pub fn focus_draft(focus: &DailyFocus) -> ScheduleDraft {
        ScheduleDraft {
            kind: EntityKind::Focus,
            days: Some([focus.day_index].into_iter().collect()),
            date: None,
            start_time: FOCUS_START.to_string(),
            end_time: FOCUS_END.to_string(),
            title: focus.title.clone(),
            description: focus.description.clone(),
            color: focus.color,
        }
    }

    /// Tasks are due on their weekday within the displayed week.
    pub fn task_draft(task: &ExtractedTask, window: &WeekWindow) -> TaskDraft {
        TaskDraft {
            text: task.text.clone(),
            completed: task.completed,
            due_date: window.date_for_weekday(task.day_index),
        }
    }

    /* ------------------------------- Persist ------------------------------- */

    /// Write blocks, then focus labels, then tasks, one record each.
    pub fn persist_import<S: ScheduleStore + ?Sized>(
        store: &mut S,
        user: &UserId,
        schedule: &ParsedSchedule,
        window: &WeekWindow,
        options: ImportOptions,
    ) -> Result<ImportSummary, ImportError> {
        let writes = schedule
            .blocks
            .iter()
            .map(|b| (RecordKind::Block, SCHEDULE_COLLECTION, to_fields(&block_draft(b))))
            .chain(
                schedule
                    .daily_focus
                    .iter()
                    .map(|f| (RecordKind::Focus, SCHEDULE_COLLECTION, to_fields(&focus_draft(f)))),
            )
            .chain(
                schedule
                    .tasks
                    .iter()
                    .map(|t| (RecordKind::Task, TASKS_COLLECTION, to_fields(&task_draft(t, window)))),
            );

        let mut written: Vec<(&'static str, RecordId)> = Vec::new();
        for (kind, collection, fields) in writes {
            match fields.and_then(|f: Fields| store.append(user, collection, f)) {
                Ok(doc) => {
                    debug!(%kind, collection, id = %doc.id, "imported record");
                    written.push((collection, doc.id));
                }
                Err(source) => {
                    error!(%kind, written = written.len(), error = %source, "schedule import failed");
                    if options.rollback_on_failure {
                        roll_back(store, user, &written);
                    }
                    return Err(ImportError::Persistence {
                        kind,
                        written: written.len(),
                        source,
                    });
                }
            }
        }

        let counts = ImportCounts::of(schedule);
        info!(%user, %counts, "schedule imported");
        Ok(ImportSummary {
            counts,
            record_ids: written.into_iter().map(|(_, id)| id).collect(),
        })
    }

    fn roll_back<S: ScheduleStore + ?Sized>(
        store: &mut S,
        user: &UserId,
        written: &[(&'static str, RecordId)],
    ) {
        for (collection, id) in written.iter().rev() {
            if let Err(err) = store.delete(user, collection, *id) {
                warn!(collection, %id, error = %err, "rollback delete failed");
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::storage::{
            Document, MemoryStore, SnapshotCallback, SubscriptionId, decode_lenient,
        };
        use chrono::NaiveDate;
        use serde_json::{Value, json};

        const DOC: &str = "| Block | Time | What |
|---|---|---|
| Morning | 9:00–12:00 | Deep work |

## Monday — Setup & Learn
- [ ] Buy domain name
";

        fn window() -> WeekWindow {
            WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 10, 21).unwrap())
        }

        /// Fails every append after the first `allow` ones.
        struct FlakyStore {
            inner: MemoryStore,
            allow: usize,
            appends: usize,
        }

        impl ScheduleStore for FlakyStore {
            fn snapshot(&self, user: &UserId, collection: &str) -> Result<Vec<Document>, StoreError> {
                self.inner.snapshot(user, collection)
            }
            fn subscribe(
                &mut self,
                user: &UserId,
                collection: &str,
                callback: SnapshotCallback,
            ) -> Result<SubscriptionId, StoreError> {
                self.inner.subscribe(user, collection, callback)
            }
            fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
                self.inner.unsubscribe(id)
            }
            fn append(
                &mut self,
                user: &UserId,
                collection: &str,
                fields: Fields,
            ) -> Result<Document, StoreError> {
                if self.appends >= self.allow {
                    return Err(StoreError::Rejected("quota exceeded".into()));
                }
                self.appends += 1;
                self.inner.append(user, collection, fields)
            }
            fn update(
                &mut self,
                user: &UserId,
                collection: &str,
                id: RecordId,
                fields: Fields,
            ) -> Result<Document, StoreError> {
                self.inner.update(user, collection, id, fields)
            }
            fn delete(&mut self, user: &UserId, collection: &str, id: RecordId) -> Result<(), StoreError> {
                self.inner.delete(user, collection, id)
            }
        }

        #[test]
        fn rejects_non_markdown_names() {
            let err = preview_import("plan.txt", DOC.as_bytes()).unwrap_err();
            assert!(matches!(err, ImportError::InvalidFileType { .. }));
            assert!(is_markdown_file("week.md"));
            assert!(!is_markdown_file("md"));
        }

        #[test]
        fn rejects_binary_content() {
            let err = preview_import("plan.md", &[0xff, 0xfe, 0x00]).unwrap_err();
            assert!(matches!(err, ImportError::Unreadable(_)));
            assert!(err.to_string().starts_with("failed to parse file"));
        }

        #[test]
        fn rejects_documents_without_schedule() {
            let err = preview_import("notes.md", b"## Monday\n- [ ] only a task\n").unwrap_err();
            assert!(matches!(err, ImportError::NoScheduleData));
        }

        #[test]
        fn preview_counts_items() {
            let preview = preview_import("week.md", DOC.as_bytes()).unwrap();
            assert_eq!(
                preview.counts,
                ImportCounts {
                    blocks: 1,
                    daily_focus: 1,
                    tasks: 1
                }
            );
            assert_eq!(preview.counts.total(), 3);
        }

        #[test]
        fn confirmed_import_writes_one_record_per_item() {
            let preview = preview_import("week.md", DOC.as_bytes()).unwrap();
            let mut store = MemoryStore::new();
            let user = UserId::from("u1");

            let summary = persist_import(
                &mut store,
                &user,
                &preview.schedule,
                &window(),
                ImportOptions::default(),
            )
            .unwrap();
            assert_eq!(summary.record_ids.len(), 3);

            let schedule = store.snapshot(&user, SCHEDULE_COLLECTION).unwrap();
            let tasks = store.snapshot(&user, TASKS_COLLECTION).unwrap();
            assert_eq!(schedule.len(), 2);
            assert_eq!(tasks.len(), 1);

            let focus = schedule
                .iter()
                .find(|d| d.fields["type"] == json!("focus"))
                .expect("focus record");
            assert_eq!(focus.fields["days"], json!([1]));
            assert_eq!(focus.fields["startTime"], json!("00:00"));
            assert_eq!(focus.fields["endTime"], json!("23:59"));
            assert_eq!(focus.fields["title"], json!("Setup & Learn"));
            assert_eq!(focus.fields["color"], json!("blue"));
            assert!(focus.fields.get("description").is_none());

            let block = schedule
                .iter()
                .find(|d| d.fields["type"] == json!("block"))
                .expect("block record");
            assert_eq!(block.fields["days"], json!([1, 2, 3, 4]));
            assert_eq!(block.fields["startTime"], json!("09:00"));
            assert!(block.fields.get("date").is_none());

            assert_eq!(tasks[0].fields["text"], json!("Buy domain name"));
            assert_eq!(tasks[0].fields["completed"], json!(false));
            assert_eq!(tasks[0].fields["dueDate"], json!("2026-10-19"));

            let entities: Vec<ScheduleEntity> = decode_lenient(&schedule);
            assert_eq!(entities.len(), 2);
            let records: Vec<TaskRecord> = decode_lenient(&tasks);
            assert_eq!(records[0].due_date, NaiveDate::from_ymd_opt(2026, 10, 19));
        }

        #[test]
        fn failed_write_stops_the_batch_and_keeps_earlier_records() {
            let preview = preview_import("week.md", DOC.as_bytes()).unwrap();
            let mut store = FlakyStore {
                inner: MemoryStore::new(),
                allow: 1,
                appends: 0,
            };
            let user = UserId::from("u1");

            let err = persist_import(
                &mut store,
                &user,
                &preview.schedule,
                &window(),
                ImportOptions::default(),
            )
            .unwrap_err();
            match err {
                ImportError::Persistence { kind, written, .. } => {
                    assert_eq!(kind, RecordKind::Focus);
                    assert_eq!(written, 1);
                }
                other => panic!("unexpected error {other:?}"),
            }
            assert_eq!(store.snapshot(&user, SCHEDULE_COLLECTION).unwrap().len(), 1);
            assert!(store.snapshot(&user, TASKS_COLLECTION).unwrap().is_empty());
        }

        #[test]
        fn rollback_removes_partial_batch() {
            let preview = preview_import("week.md", DOC.as_bytes()).unwrap();
            let mut store = FlakyStore {
                inner: MemoryStore::new(),
                allow: 2,
                appends: 0,
            };
            let user = UserId::from("u1");

            let err = persist_import(
                &mut store,
                &user,
                &preview.schedule,
                &window(),
                ImportOptions {
                    rollback_on_failure: true,
                },
            )
            .unwrap_err();
            assert!(matches!(
                err,
                ImportError::Persistence {
                    kind: RecordKind::Task,
                    written: 2,
                    ..
                }
            ));
            assert!(store.snapshot(&user, SCHEDULE_COLLECTION).unwrap().is_empty());
        }

        #[test]
        fn focus_description_is_written() {
            let focus = DailyFocus {
                day_index: 5,
                title: "Ship".into(),
                description: Some("Release notes and tag".into()),
                color: Color::Emerald,
            };
            let fields = to_fields(&focus_draft(&focus)).unwrap();
            assert_eq!(fields["description"], Value::from("Release notes and tag"));
            assert_eq!(fields["days"], json!([5]));
        }
    }
}

pub mod live {
    //! Keeps a decoded copy of a user's schedule in step with store snapshots so the
    //! week grid can be re-projected after every change.

    use crate::model::{ScheduleEntity, UserId};
    use crate::projection::{GridLayout, WeekGrid, WeekWindow, project_week};
    use crate::storage::{
        Document, SCHEDULE_COLLECTION, ScheduleStore, StoreError, SubscriptionId, decode_lenient,
    };
    use chrono::NaiveDateTime;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Debug)]
    pub struct LiveSchedule {
        entities: Rc<RefCell<Vec<ScheduleEntity>>>,
        subscription: SubscriptionId,
    }

    impl LiveSchedule {
        pub fn attach<S: ScheduleStore + ?Sized>(
            store: &mut S,
            user: &UserId,
        ) -> Result<Self, StoreError> {
            let entities: Rc<RefCell<Vec<ScheduleEntity>>> = Rc::default();
            let sink = Rc::clone(&entities);
            let subscription = store.subscribe(
                user,
                SCHEDULE_COLLECTION,
                Box::new(move |docs: &[Document]| *sink.borrow_mut() = decode_lenient(docs)),
            )?;
            Ok(Self {
                entities,
                subscription,
            })
        }

        pub fn entities(&self) -> Vec<ScheduleEntity> {
            self.entities.borrow().clone()
        }

        pub fn week(&self, window: &WeekWindow, layout: &GridLayout, now: NaiveDateTime) -> WeekGrid {
            project_week(&self.entities.borrow(), window, layout, now)
        }

        pub fn detach<S: ScheduleStore + ?Sized>(self, store: &mut S) -> bool {
            store.unsubscribe(self.subscription)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::import::{ImportOptions, persist_import, preview_text};
        use crate::storage::MemoryStore;
        use chrono::NaiveDate;

        #[test]
        fn grid_reflects_imported_records() {
            let mut store = MemoryStore::new();
            let user = UserId::from("u1");
            let live = LiveSchedule::attach(&mut store, &user).unwrap();
            assert!(live.entities().is_empty());

            let preview = preview_text(
                "| Block | Time | What |\n|---|---|---|\n| AM | 10:00-11:00 | Writing |\n\n## Wednesday — Review\n",
            )
            .unwrap();
            let today = NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
            let window = WeekWindow::containing(today);
            persist_import(&mut store, &user, &preview.schedule, &window, ImportOptions::default())
                .unwrap();

            assert_eq!(live.entities().len(), 2);
            let now = today.and_hms_opt(10, 0, 0).unwrap();
            let grid = live.week(&window, &GridLayout::default(), now);
            let wednesday = &grid.days[3];
            assert!(wednesday.is_today);
            assert_eq!(wednesday.focus.as_ref().map(|f| f.title.as_str()), Some("Review"));
            let ten = wednesday.slots.iter().find(|s| s.hour == 10).unwrap();
            assert_eq!(ten.entries[0].title, "Writing");
            assert!(grid.days[5].slots.iter().all(|s| s.entries.is_empty()));

            assert!(live.detach(&mut store));
        }
    }
}

pub mod config {
    //! Optional JSON settings file; every field falls back to its default.

    use crate::import::ImportOptions;
    use crate::projection::GridLayout;
    use serde::{Deserialize, Serialize};
    use std::{
        fs,
        path::{Path, PathBuf},
    };

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct PlannerConfig {
        pub grid: GridLayout,
        pub import: ImportOptions,
        /// Used when `--user` is not given.
        pub default_user: Option<String>,
        /// Used when `--store` is not given.
        pub store_path: Option<PathBuf>,
    }

    #[derive(Debug, thiserror::Error)]
    pub enum ConfigError {
        #[error("reading config {path:?}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("parsing config {path:?}")]
        Parse {
            path: PathBuf,
            #[source]
            source: serde_json::Error,
        },
    }

    impl PlannerConfig {
        pub fn load(path: &Path) -> Result<Self, ConfigError> {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn partial_config_keeps_defaults() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("planner.json");
            fs::write(&path, r#"{"grid": {"rowHeight": 60.0}, "defaultUser": "me"}"#)
                .expect("write");

            let cfg = PlannerConfig::load(&path).expect("load");
            assert_eq!(cfg.grid.row_height, 60.0);
            assert_eq!(cfg.grid.first_hour, 8);
            assert_eq!(cfg.grid.hour_count, 12);
            assert_eq!(cfg.default_user.as_deref(), Some("me"));
            assert!(!cfg.import.rollback_on_failure);
            assert!(cfg.store_path.is_none());
        }

        #[test]
        fn missing_or_malformed_config_is_an_error() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let missing = tmp.path().join("nope.json");
            assert!(matches!(
                PlannerConfig::load(&missing),
                Err(ConfigError::Io { .. })
            ));

            let bad = tmp.path().join("bad.json");
            fs::write(&bad, "[1, 2").expect("write");
            assert!(matches!(
                PlannerConfig::load(&bad),
                Err(ConfigError::Parse { .. })
            ));
        }
    }
}

pub use import::{persist_import, preview_import};
pub use parser::parse_schedule_markdown;
pub use projection::project_week;
