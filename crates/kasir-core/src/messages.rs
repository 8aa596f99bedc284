//! # WhatsApp Message Templates
//!
//! Plain-text bodies queued in the WhatsApp outbox. WhatsApp renders
//! `*bold*` and `_italic_` markers.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::money::Money;

/// Reminder offsets in days relative to the expiry date. Negative is before.
pub const REMINDER_OFFSETS: [i64; 7] = [-7, -3, -1, 0, 1, 3, 7];

/// WIB (UTC+7), the business timezone for calendar-day comparisons.
pub const JAKARTA_UTC_OFFSET_HOURS: i64 = 7;

/// Local calendar date in Jakarta.
pub fn jakarta_date(at: DateTime<Utc>) -> NaiveDate {
    (at + Duration::hours(JAKARTA_UTC_OFFSET_HOURS)).date_naive()
}

/// Offset of `today` from the subscription's expiry date, when a reminder
/// is due for it today.
///
/// Before expiry only `active` rows qualify; from the expiry day on, `active`
/// and `expired` both do.
pub fn reminder_offset(
    ends_at: DateTime<Utc>,
    status: crate::subscription::SubscriptionStatus,
    now: DateTime<Utc>,
) -> Option<i64> {
    use crate::subscription::SubscriptionStatus::{Active, Expired};

    let offset = (jakarta_date(now) - jakarta_date(ends_at)).num_days();
    if !REMINDER_OFFSETS.contains(&offset) {
        return None;
    }
    let eligible = if offset < 0 {
        status == Active
    } else {
        matches!(status, Active | Expired)
    };
    eligible.then_some(offset)
}

const MONTHS_ID: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni", "Juli", "Agustus", "September",
    "Oktober", "November", "Desember",
];

/// `10 Maret 2025`.
pub fn format_date_id(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        MONTHS_ID[date.month0() as usize],
        date.year()
    )
}

pub fn otp_message(code: &str) -> String {
    format!(
        "🔐 *KODE VERIFIKASI KASIR*\n\n\
         Kode verifikasi Anda adalah:\n\n\
         *{code}*\n\n\
         Kode ini berlaku selama {ttl} menit.\n\n\
         ⚠️ Jangan bagikan kode ini kepada siapapun.\n\n\
         Jika Anda tidak meminta kode ini, abaikan pesan ini.\n\n\
         _Pesan otomatis_",
        code = code,
        ttl = crate::OTP_TTL_MINUTES,
    )
}

/// Data shown in a subscription reminder.
#[derive(Debug, Clone)]
pub struct ReminderContext<'a> {
    pub owner_name: &'a str,
    pub plan_name: &'a str,
    pub ends_at: DateTime<Utc>,
    pub amount_paid: Money,
    pub dashboard_url: &'a str,
}

/// Reminder for `offset` days relative to expiry (see `REMINDER_OFFSETS`).
pub fn reminder_message(ctx: &ReminderContext<'_>, offset: i64) -> String {
    let name = if ctx.owner_name.trim().is_empty() {
        "Owner"
    } else {
        ctx.owner_name.trim()
    };
    let ends = format_date_id(jakarta_date(ctx.ends_at));

    let footer = format!(
        "💡 *Aksi yang Diperlukan:*\n\
         Silakan segera perpanjang paket subscription Anda.\n\n\
         🔗 Login ke dashboard Anda untuk melakukan perpanjangan:\n\
         {}\n\n\
         Terima kasih atas kepercayaan Anda! 🙏\n\n\
         _Pesan ini dikirim otomatis_",
        ctx.dashboard_url
    );

    if offset <= 0 {
        let days_left = -offset;
        let urgency = match days_left {
            7 => "⚠️ *Pengingat 7 Hari:* Paket Anda akan berakhir dalam 7 hari lagi.",
            3 => "🚨 *Penting!* Paket Anda akan berakhir dalam 3 hari lagi!",
            1 => "🚨🚨 *SANGAT MENDESAK!* Paket Anda akan berakhir BESOK!",
            0 => "🚨🚨🚨 *HARI TERAKHIR!* Paket Anda akan berakhir HARI INI!",
            _ => "Paket Anda akan segera berakhir.",
        };
        format!(
            "📦 *PENGINGAT PERPANJANGAN PAKET SUBSCRIPTION*\n\n\
             Halo *{name}!*\n\n\
             {urgency}\n\n\
             📋 *Detail Paket:*\n\
             • Paket: *{plan}*\n\
             • Berakhir: *{ends}*\n\
             • Hari Tersisa: *{days_left} hari*\n\
             • Jumlah Terakhir: *{amount}*\n\n\
             {footer}",
            plan = ctx.plan_name,
            amount = ctx.amount_paid,
        )
    } else {
        let headline = match offset {
            1 => "⚠️ *Paket Anda Sudah Berakhir*".to_string(),
            n => format!("🚨 *Paket Sudah Berakhir {} Hari*", n),
        };
        let when = if offset == 1 {
            "kemarin".to_string()
        } else {
            format!("{} hari yang lalu", offset)
        };
        format!(
            "📦 *PAKET SUBSCRIPTION SUDAH BERAKHIR*\n\n\
             Halo *{name}!*\n\n\
             {headline}\n\n\
             Paket subscription Anda sudah berakhir {when}. Layanan Anda saat ini tidak aktif.\n\n\
             📋 *Detail Paket:*\n\
             • Paket: *{plan}*\n\
             • Berakhir: *{ends}*\n\
             • Jumlah Terakhir: *{amount}*\n\n\
             {footer}",
            plan = ctx.plan_name,
            amount = ctx.amount_paid,
        )
    }
}

/// Receipt sent after a paid order.
pub fn receipt_message(business_name: &str, order_number: &str, total: Money, receipt_url: &str) -> String {
    format!(
        "🎉 *Terima kasih telah berbelanja!*\n\n\
         🏢 *{business_name}*\n\n\
         🆔 Order: *{order_number}*\n\
         💵 *Total Pembayaran: {total}*\n\n\
         📄 *Lihat struk lengkap di sini:*\n\n\
         🔗 {receipt_url}\n\n\
         🙏 *Sampai jumpa lagi!*"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(ends_at: DateTime<Utc>) -> ReminderContext<'static> {
        ReminderContext {
            owner_name: "Sari",
            plan_name: "Professional",
            ends_at,
            amount_paid: Money::from_rupiah(300_000),
            dashboard_url: "https://app.example.com",
        }
    }

    #[test]
    fn test_jakarta_date_crosses_midnight() {
        // 20:00 UTC is 03:00 next day in Jakarta
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 20, 0, 0).unwrap();
        assert_eq!(jakarta_date(at), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    }

    #[test]
    fn test_reminder_offset() {
        use crate::subscription::SubscriptionStatus;

        let now = Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap();
        let in_three_days = now + Duration::days(3);
        assert_eq!(
            reminder_offset(in_three_days, SubscriptionStatus::Active, now),
            Some(-3)
        );
        assert_eq!(reminder_offset(in_three_days, SubscriptionStatus::Expired, now), None);

        let week_ago = now - Duration::days(7);
        assert_eq!(reminder_offset(week_ago, SubscriptionStatus::Expired, now), Some(7));
        assert_eq!(reminder_offset(week_ago, SubscriptionStatus::Cancelled, now), None);

        let in_five_days = now + Duration::days(5);
        assert_eq!(reminder_offset(in_five_days, SubscriptionStatus::Active, now), None);
    }

    #[test]
    fn test_format_date_id() {
        let d = NaiveDate::from_ymd_opt(2025, 8, 17).unwrap();
        assert_eq!(format_date_id(d), "17 Agustus 2025");
    }

    #[test]
    fn test_otp_message_contains_code() {
        let msg = otp_message("042917");
        assert!(msg.contains("*042917*"));
        assert!(msg.contains("10 menit"));
    }

    #[test]
    fn test_reminder_before_expiry() {
        let ends = Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap();
        let msg = reminder_message(&ctx(ends), -3);
        assert!(msg.contains("3 hari lagi"));
        assert!(msg.contains("10 Maret 2025"));
        assert!(msg.contains("Rp 300.000"));
        assert!(msg.contains("Hari Tersisa: *3 hari*"));
    }

    #[test]
    fn test_reminder_on_expiry_day() {
        let msg = reminder_message(&ctx(Utc::now()), 0);
        assert!(msg.contains("HARI INI"));
    }

    #[test]
    fn test_reminder_after_expiry() {
        let msg = reminder_message(&ctx(Utc::now()), 1);
        assert!(msg.contains("sudah berakhir kemarin"));
        let msg = reminder_message(&ctx(Utc::now()), 7);
        assert!(msg.contains("7 hari yang lalu"));
    }

    #[test]
    fn test_receipt_message() {
        let msg = receipt_message(
            "Kopi Senja",
            "ORD-AB12CD34",
            Money::from_rupiah(45_835),
            "https://app.example.com/receipt/tok",
        );
        assert!(msg.contains("ORD-AB12CD34"));
        assert!(msg.contains("Rp 45.835"));
        assert!(msg.contains("/receipt/tok"));
    }
}
