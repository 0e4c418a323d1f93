//! Instruction preamble and greeting for a consultation.

use chrono::{DateTime, Datelike, Local, Weekday};
use minijinja::{context, Environment};

use crate::categories::Selection;
use crate::constants;

const PREAMBLE_TEMPLATE: &str = include_str!("../templates/preamble.txt");
const PREAMBLE_NAME: &str = "preamble.txt";

/// Service that also needs the partner's birth details.
const PARTNER_SERVICE: &str = "프리미엄 궁합";

fn weekday_ko(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "월요일",
        Weekday::Tue => "화요일",
        Weekday::Wed => "수요일",
        Weekday::Thu => "목요일",
        Weekday::Fri => "금요일",
        Weekday::Sat => "토요일",
        Weekday::Sun => "일요일",
    }
}

/// `2026년 01월 01일 09시 30분 (목요일)`
pub fn format_timestamp(now: &DateTime<Local>) -> String {
    format!(
        "{} ({})",
        now.format("%Y년 %m월 %d일 %H시 %M분"),
        weekday_ko(now.weekday())
    )
}

pub fn greeting(selection: &Selection) -> String {
    format!(
        "어서오게. [{}]을 보러 왔는가? 사주 명반을 펼치기 전에 자네의 통성명과 생년월일시부터 차근차근 알려주시게.",
        selection.sub
    )
}

pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(PREAMBLE_NAME, PREAMBLE_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn preamble(&self, selection: &Selection, now: &DateTime<Local>) -> Result<String, minijinja::Error> {
        let template = self.env.get_template(PREAMBLE_NAME)?;
        template.render(context! {
            counselor => constants::COUNSELOR_NAME,
            timestamp => format_timestamp(now),
            service => &selection.sub,
            needs_partner => selection.sub == PARTNER_SERVICE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_year_morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 1, 9, 5, 0).unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(&new_year_morning()), "2026년 01월 01일 09시 05분 (목요일)");
    }

    #[test]
    fn test_preamble_embeds_time_and_service() {
        let builder = PromptBuilder::new().unwrap();
        let selection = Selection::new("생활운세", "오늘의 운세");
        let preamble = builder.preamble(&selection, &new_year_morning()).unwrap();

        assert!(preamble.contains("'지천명'"));
        assert!(preamble.contains("2026년 01월 01일 09시 05분"));
        assert!(preamble.contains("[오늘의 운세]"));
        assert!(preamble.contains("태어난 시간"));
        assert!(!preamble.contains("상대방"));
    }

    #[test]
    fn test_partner_rule_only_for_compatibility() {
        let builder = PromptBuilder::new().unwrap();
        let selection = Selection::new("애정/궁합", "프리미엄 궁합");
        let preamble = builder.preamble(&selection, &new_year_morning()).unwrap();
        assert!(preamble.contains("상대방의 이름"));
    }

    #[test]
    fn test_greeting_mentions_selection() {
        let text = greeting(&Selection::new("정통운세", "평생운세"));
        assert!(text.starts_with("어서오게. [평생운세]"));
    }
}
