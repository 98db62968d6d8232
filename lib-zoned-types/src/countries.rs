//! Static geography tables: ISO 3166 country code to continent, and the
//! region to region-group buckets used for sub-country targeting.
//!
//! Continent names are the lower-case dashed forms used in zone files
//! (`north-america`, not `NA`).

/// Continent for a lower-case ISO 3166-1 alpha-2 country code, or `None`
/// for an unknown code.
pub fn continent(country: &str) -> Option<&'static str> {
    let c = match country {
        "ad" | "al" | "at" | "ax" | "ba" | "be" | "bg" | "by" | "ch" | "cy" | "cz" | "de"
        | "dk" | "ee" | "es" | "fi" | "fo" | "fr" | "gb" | "gg" | "gi" | "gr" | "hr" | "hu"
        | "ie" | "im" | "is" | "it" | "je" | "li" | "lt" | "lu" | "lv" | "mc" | "md" | "me"
        | "mk" | "mt" | "nl" | "no" | "pl" | "pt" | "ro" | "rs" | "ru" | "se" | "si" | "sj"
        | "sk" | "sm" | "ua" | "uk" | "va" | "xk" => "europe",

        "ae" | "af" | "am" | "az" | "bd" | "bh" | "bn" | "bt" | "cn" | "ge" | "hk" | "id"
        | "il" | "in" | "iq" | "ir" | "jo" | "jp" | "kg" | "kh" | "kp" | "kr" | "kw" | "kz"
        | "la" | "lb" | "lk" | "mm" | "mn" | "mo" | "mv" | "my" | "np" | "om" | "ph" | "pk"
        | "ps" | "qa" | "sa" | "sg" | "sy" | "th" | "tj" | "tl" | "tm" | "tr" | "tw" | "uz"
        | "vn" | "ye" => "asia",

        "ag" | "ai" | "aw" | "bb" | "bl" | "bm" | "bq" | "bs" | "bz" | "ca" | "cr" | "cu"
        | "cw" | "dm" | "do" | "gd" | "gl" | "gp" | "gt" | "hn" | "ht" | "jm" | "kn" | "ky"
        | "lc" | "mf" | "mq" | "ms" | "mx" | "ni" | "pa" | "pm" | "pr" | "sv" | "sx" | "tc"
        | "tt" | "us" | "vc" | "vg" | "vi" => "north-america",

        "ar" | "bo" | "br" | "cl" | "co" | "ec" | "fk" | "gf" | "gy" | "pe" | "py" | "sr"
        | "uy" | "ve" => "south-america",

        "ao" | "bf" | "bi" | "bj" | "bw" | "cd" | "cf" | "cg" | "ci" | "cm" | "cv" | "dj"
        | "dz" | "eg" | "eh" | "er" | "et" | "ga" | "gh" | "gm" | "gn" | "gq" | "gw" | "ke"
        | "km" | "lr" | "ls" | "ly" | "ma" | "mg" | "ml" | "mr" | "mu" | "mw" | "mz" | "na"
        | "ne" | "ng" | "re" | "rw" | "sc" | "sd" | "sh" | "sl" | "sn" | "so" | "ss" | "st"
        | "sz" | "td" | "tg" | "tn" | "tz" | "ug" | "yt" | "za" | "zm" | "zw" => "africa",

        "as" | "au" | "ck" | "cx" | "fj" | "fm" | "gu" | "ki" | "mh" | "mp" | "nc" | "nf"
        | "nr" | "nu" | "nz" | "pf" | "pg" | "pn" | "pw" | "sb" | "tk" | "to" | "tv" | "vu"
        | "wf" | "ws" => "oceania",

        "aq" | "bv" | "gs" | "hm" | "tf" => "antarctica",

        _ => return None,
    };
    Some(c)
}

/// Region group for a `<cc>-<subdivision>` region. Only the US and Russia
/// have groups; every other country yields `None`.
pub fn region_group(country: &str, region: &str) -> Option<&'static str> {
    if country != "us" && country != "ru" {
        return None;
    }

    let group = match region {
        "us-ak" | "us-az" | "us-ca" | "us-co" | "us-hi" | "us-id" | "us-mt" | "us-nm"
        | "us-nv" | "us-or" | "us-ut" | "us-wa" | "us-wy" => "us-west",

        "us-ar" | "us-ia" | "us-il" | "us-in" | "us-ks" | "us-la" | "us-mn" | "us-mo"
        | "us-nd" | "us-ne" | "us-ok" | "us-sd" | "us-tx" | "us-wi" => "us-central",

        "us-al" | "us-ct" | "us-dc" | "us-de" | "us-fl" | "us-ga" | "us-ky" | "us-ma"
        | "us-md" | "us-me" | "us-mi" | "us-ms" | "us-nc" | "us-nh" | "us-nj" | "us-ny"
        | "us-oh" | "us-pa" | "us-ri" | "us-sc" | "us-tn" | "us-va" | "us-vt" | "us-wv" => {
            "us-east"
        }

        // https://en.wikipedia.org/wiki/Federal_districts_of_Russia
        "ru-00" | "ru-09" | "ru-10" | "ru-83" | "ru-86" | "ru-21" | "ru-25" | "ru-41"
        | "ru-37" | "ru-43" | "ru-47" | "ru-48" | "ru-56" | "ru-62" | "ru-69" | "ru-72"
        | "ru-77" | "ru-76" | "ru-88" => "ru-cfd",

        "ru-01" | "ru-07" | "ru-84" | "ru-24" | "ru-38" | "ru-61" => "ru-ufd",

        "ru-06" | "ru-85" | "ru-23" | "ru-28" | "ru-34" | "ru-42" | "ru-49" | "ru-50"
        | "ru-52" | "ru-60" | "ru-66" => "ru-nwfd",

        "ru-05" | "ru-89" | "ru-26" | "ru-92" | "ru-36" | "ru-44" | "ru-59" | "ru-63"
        | "ru-64" | "ru-30" | "ru-15" => "ru-fefd",

        "ru-03" | "ru-04" | "ru-11" | "ru-20" | "ru-29" | "ru-39" | "ru-91" | "ru-18"
        | "ru-74" | "ru-53" | "ru-54" | "ru-75" | "ru-79" | "ru-31" | "ru-93" | "ru-02"
        | "ru-14" => "ru-sibfd",

        "ru-40" | "ru-71" | "ru-78" | "ru-32" | "ru-13" | "ru-87" => "ru-uralfd",

        "ru-08" | "ru-33" | "ru-45" | "ru-46" | "ru-51" | "ru-55" | "ru-57" | "ru-58"
        | "ru-90" | "ru-65" | "ru-67" | "ru-73" | "ru-80" | "ru-81" | "ru-16" => "ru-vfd",

        "ru-17" | "ru-19" | "ru-22" | "ru-27" | "ru-68" | "ru-70" | "ru-12" => "ru-sfd",

        _ => {
            tracing::debug!(%country, %region, "no region group for region");
            return None;
        }
    };
    Some(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continent_known_codes() {
        assert_eq!(Some("europe"), continent("dk"));
        assert_eq!(Some("north-america"), continent("us"));
        assert_eq!(Some("asia"), continent("jp"));
        assert_eq!(Some("south-america"), continent("br"));
        assert_eq!(Some("oceania"), continent("nz"));
        assert_eq!(Some("africa"), continent("za"));
    }

    #[test]
    fn continent_unknown_code() {
        assert_eq!(None, continent("zz"));
        assert_eq!(None, continent(""));
    }

    #[test]
    fn region_group_us_and_ru() {
        assert_eq!(Some("us-west"), region_group("us", "us-ca"));
        assert_eq!(Some("us-east"), region_group("us", "us-ny"));
        assert_eq!(Some("us-central"), region_group("us", "us-tx"));
        assert_eq!(Some("ru-cfd"), region_group("ru", "ru-77"));
    }

    #[test]
    fn region_group_other_countries_have_none() {
        assert_eq!(None, region_group("de", "de-by"));
        assert_eq!(None, region_group("us", "us-xx"));
    }
}
